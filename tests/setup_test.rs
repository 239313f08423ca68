//! Assembling runnable monitors from monitors-file entries.

use std::sync::Arc;

use forum_monitor::config::Config;
use forum_monitor::monitors::MonitorEntry;
use forum_monitor::notify::NotifierOptions;
use forum_monitor::runner::{MonitorStatus, RunSummary};
use forum_monitor::setup::assemble_monitors;
use serial_test::serial;

const WEBHOOK_VAR: &str = "FORUM_MONITOR_TEST_WEBHOOK";
const UNSET_WEBHOOK_VAR: &str = "FORUM_MONITOR_TEST_UNSET_WEBHOOK";

fn test_config() -> Config {
    Config {
        default_webhook_env: WEBHOOK_VAR.to_string(),
        ..Config::for_testing()
    }
}

fn thread_entry(id: &str) -> MonitorEntry {
    MonitorEntry {
        id: Some(id.to_string()),
        name: Some(format!("Hilo {id}")),
        kind: Some("thread".to_string()),
        forum_url: Some("https://rol.foroactivo.com".to_string()),
        thread_url: Some(format!("https://rol.foroactivo.com/t12-{id}")),
        ..MonitorEntry::default()
    }
}

fn status<'a>(summary: &'a RunSummary, id: &str) -> &'a MonitorStatus {
    &summary
        .report(id)
        .unwrap_or_else(|| panic!("no report for {id}"))
        .status
}

#[test]
#[serial]
fn test_disabled_and_invalid_entries_are_reported() {
    std::env::set_var(WEBHOOK_VAR, "https://discord.test/api/webhooks/1/a");
    std::env::remove_var(UNSET_WEBHOOK_VAR);

    let entries = vec![
        thread_entry("activo"),
        // Incomplete, but switched off
        MonitorEntry {
            id: Some("pausado".to_string()),
            kind: Some("forum".to_string()),
            forum_url: Some("https://rol.foroactivo.com".to_string()),
            enabled: Some(false),
            ..MonitorEntry::default()
        },
        MonitorEntry {
            thread_url: None,
            ..thread_entry("roto")
        },
        MonitorEntry {
            discord_webhook_env: Some(UNSET_WEBHOOK_VAR.to_string()),
            ..thread_entry("sin-webhook")
        },
    ];

    let mut summary = RunSummary::default();
    let monitors = assemble_monitors(
        &test_config(),
        &NotifierOptions::default(),
        &entries,
        &mut summary,
    );

    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].config.id, "activo");

    assert!(matches!(status(&summary, "pausado"), MonitorStatus::Disabled));
    for id in ["roto", "sin-webhook"] {
        match status(&summary, id) {
            MonitorStatus::Failed { error, .. } => assert_eq!(error.kind(), "config_error"),
            other => panic!("expected config failure for {id}, got {other:?}"),
        }
    }
    assert_eq!(summary.failures(), 2);

    std::env::remove_var(WEBHOOK_VAR);
}

#[test]
#[serial]
fn test_only_disabled_entries_is_a_successful_run() {
    let entries = vec![MonitorEntry {
        id: Some("pausado".to_string()),
        enabled: Some(false),
        ..MonitorEntry::default()
    }];

    let mut summary = RunSummary::default();
    let monitors = assemble_monitors(
        &test_config(),
        &NotifierOptions::default(),
        &entries,
        &mut summary,
    );

    assert!(monitors.is_empty());
    assert!(summary.is_success());
}

#[test]
#[serial]
fn test_collaborators_shared_per_forum_and_webhook() {
    std::env::set_var(WEBHOOK_VAR, "https://discord.test/api/webhooks/1/a");

    let entries = vec![thread_entry("uno"), thread_entry("dos")];
    let mut summary = RunSummary::default();
    let monitors = assemble_monitors(
        &test_config(),
        &NotifierOptions::default(),
        &entries,
        &mut summary,
    );

    assert_eq!(monitors.len(), 2);
    assert!(Arc::ptr_eq(&monitors[0].source, &monitors[1].source));
    assert!(Arc::ptr_eq(&monitors[0].sink, &monitors[1].sink));
    assert!(summary.reports.is_empty());

    std::env::remove_var(WEBHOOK_VAR);
}
