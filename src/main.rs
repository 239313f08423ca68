use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_monitor::config::Config;
use forum_monitor::monitors;
use forum_monitor::notify::NotifierOptions;
use forum_monitor::runner::{RunSummary, Runner};
use forum_monitor::setup::assemble_monitors;
use forum_monitor::state::StateStore;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Run every monitor once. Returns whether all enabled monitors succeeded.
async fn run() -> Result<bool> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting forum-monitor");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let entries = monitors::load_entries(&config.monitors_file).with_context(|| {
        format!(
            "Failed to load monitors from {}",
            config.monitors_file.display()
        )
    })?;

    info!(
        monitors_file = %config.monitors_file.display(),
        state_file = %config.state_file.display(),
        monitors = entries.len(),
        "Configuration loaded"
    );

    let store = StateStore::open(&config.state_file, config.seen_thread_cap)
        .await
        .context("Failed to open state file")?;

    let options = NotifierOptions::from_config(&config);
    let mut summary = RunSummary::default();
    let monitors = assemble_monitors(&config, &options, &entries, &mut summary);

    let mut runner = Runner::new(store, config.fetch_timeout, options.max_send_duration());
    summary.extend(runner.run(&monitors).await);
    summary.log();

    Ok(summary.is_success())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forum_monitor=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
