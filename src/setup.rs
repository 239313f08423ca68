//! Turning the monitors file into runnable monitors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::forum::{ForoactivoClient, ForumSource};
use crate::monitors::{validate_entries, EntryCheck, MonitorConfig, MonitorEntry};
use crate::notify::{DiscordNotifier, NotificationSink, NotifierOptions};
use crate::runner::{Monitor, MonitorError, MonitorReport, RunSummary};

/// Build runnable monitors from the file entries.
///
/// Invalid and disabled entries are recorded in `summary` instead. Forum
/// clients are shared per forum so each logs in once; notifiers are shared
/// per webhook so pacing spans every monitor posting to it.
pub fn assemble_monitors(
    config: &Config,
    options: &NotifierOptions,
    entries: &[MonitorEntry],
    summary: &mut RunSummary,
) -> Vec<Monitor> {
    let mut sources: HashMap<String, Arc<dyn ForumSource>> = HashMap::new();
    let mut sinks: HashMap<String, Arc<dyn NotificationSink>> = HashMap::new();

    let mut assembled = Vec::new();
    for (label, check) in validate_entries(entries) {
        let monitor_config = match check {
            EntryCheck::Enabled(c) => c,
            EntryCheck::Disabled => {
                debug!(monitor_id = %label, "Monitor disabled");
                summary.push(MonitorReport::disabled(&label));
                continue;
            }
            EntryCheck::Invalid(e) => {
                warn!(monitor_id = %label, "Invalid monitor definition: {e}");
                summary.push(MonitorReport::failed(&label, e.into()));
                continue;
            }
        };

        let id = monitor_config.id.clone();
        match build_monitor(config, monitor_config, options, &mut sources, &mut sinks) {
            Ok(monitor) => assembled.push(monitor),
            Err(e) => {
                warn!(monitor_id = %id, kind = e.kind(), "Cannot start monitor: {e}");
                summary.push(MonitorReport::failed(&id, e));
            }
        }
    }

    assembled
}

fn build_monitor(
    config: &Config,
    monitor_config: MonitorConfig,
    options: &NotifierOptions,
    sources: &mut HashMap<String, Arc<dyn ForumSource>>,
    sinks: &mut HashMap<String, Arc<dyn NotificationSink>>,
) -> Result<Monitor, MonitorError> {
    let webhook_url = monitor_config.resolve_webhook(&config.default_webhook_env)?;

    let source = if let Some(source) = sources.get(&monitor_config.forum_url) {
        Arc::clone(source)
    } else {
        let client: Arc<dyn ForumSource> = Arc::new(ForoactivoClient::new(
            &monitor_config.forum_url,
            &config.forum_username,
            &config.forum_password,
            config.fetch_timeout,
        )?);
        sources.insert(monitor_config.forum_url.clone(), Arc::clone(&client));
        client
    };

    let sink = if let Some(sink) = sinks.get(&webhook_url) {
        Arc::clone(sink)
    } else {
        let notifier: Arc<dyn NotificationSink> =
            Arc::new(DiscordNotifier::new(&webhook_url, options.clone())?);
        sinks.insert(webhook_url, Arc::clone(&notifier));
        notifier
    };

    Ok(Monitor {
        config: monitor_config,
        source,
        sink,
    })
}
