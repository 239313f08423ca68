//! Sequential processing of every configured monitor.
//!
//! For each monitor: load prior state, fetch a snapshot, reconcile, deliver
//! the new items in order, then commit. A failing monitor is reported and
//! skipped; it never stops the ones after it and never has its state
//! touched beyond what was actually delivered.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::forum::{FetchError, ForumSource};
use crate::monitors::MonitorConfig;
use crate::notify::{NotificationSink, NotifyError};
use crate::reconcile::{reconcile, DiffOutcome, ReconcileError};
use crate::state::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl MonitorError {
    /// Short failure label for logs and summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Fetch(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Reconcile(_) => "store_corrupt",
            Self::Notify(e) => e.kind(),
        }
    }
}

/// A monitor together with the collaborators it talks to.
#[derive(Clone)]
pub struct Monitor {
    pub config: MonitorConfig,
    pub source: Arc<dyn ForumSource>,
    pub sink: Arc<dyn NotificationSink>,
}

/// Result of one monitor in a run.
#[derive(Debug)]
pub enum MonitorStatus {
    Disabled,
    Succeeded {
        outcome: DiffOutcome,
        notified: usize,
    },
    /// Delivery stopped partway; undelivered items stay pending for the next run.
    Partial {
        notified: usize,
        pending: usize,
        error: MonitorError,
    },
    Failed {
        error: MonitorError,
        notified: usize,
    },
}

#[derive(Debug)]
pub struct MonitorReport {
    pub monitor_id: String,
    pub status: MonitorStatus,
}

impl MonitorReport {
    #[must_use]
    pub fn disabled(monitor_id: &str) -> Self {
        Self {
            monitor_id: monitor_id.to_string(),
            status: MonitorStatus::Disabled,
        }
    }

    #[must_use]
    pub fn failed(monitor_id: &str, error: MonitorError) -> Self {
        Self {
            monitor_id: monitor_id.to_string(),
            status: MonitorStatus::Failed { error, notified: 0 },
        }
    }

    #[must_use]
    pub fn notified(&self) -> usize {
        match &self.status {
            MonitorStatus::Disabled => 0,
            MonitorStatus::Succeeded { notified, .. }
            | MonitorStatus::Partial { notified, .. }
            | MonitorStatus::Failed { notified, .. } => *notified,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            MonitorStatus::Partial { .. } | MonitorStatus::Failed { .. }
        )
    }
}

/// Per-monitor results of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<MonitorReport>,
}

impl RunSummary {
    pub fn push(&mut self, report: MonitorReport) {
        self.reports.push(report);
    }

    pub fn extend(&mut self, other: RunSummary) {
        self.reports.extend(other.reports);
    }

    #[must_use]
    pub fn total_notified(&self) -> usize {
        self.reports.iter().map(MonitorReport::notified).sum()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failure()).count()
    }

    /// True when no monitor failed or delivered only partially.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    #[must_use]
    pub fn report(&self, monitor_id: &str) -> Option<&MonitorReport> {
        self.reports.iter().find(|r| r.monitor_id == monitor_id)
    }

    /// Emit one log line per monitor and a totals line.
    pub fn log(&self) {
        for report in &self.reports {
            let id = report.monitor_id.as_str();
            match &report.status {
                MonitorStatus::Disabled => info!(monitor_id = %id, "Disabled"),
                MonitorStatus::Succeeded { outcome, notified } => info!(
                    monitor_id = %id,
                    outcome = outcome.as_str(),
                    notified,
                    "Succeeded"
                ),
                MonitorStatus::Partial {
                    notified,
                    pending,
                    error,
                } => warn!(
                    monitor_id = %id,
                    kind = error.kind(),
                    notified,
                    pending,
                    "Partially delivered: {error}"
                ),
                MonitorStatus::Failed { error, notified } => error!(
                    monitor_id = %id,
                    kind = error.kind(),
                    notified,
                    "Failed: {error}"
                ),
            }
        }
        info!(
            monitors = self.reports.len(),
            failures = self.failures(),
            notified = self.total_notified(),
            "Run complete"
        );
    }
}

/// Drives monitors against one state store.
pub struct Runner {
    store: StateStore,
    fetch_timeout: Duration,
    delivery_timeout: Duration,
}

impl Runner {
    /// `delivery_timeout` bounds one whole `send`, including any pacing or
    /// rate-limit waits the sink performs (see
    /// [`NotifierOptions::max_send_duration`](crate::notify::NotifierOptions::max_send_duration)).
    #[must_use]
    pub fn new(store: StateStore, fetch_timeout: Duration, delivery_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
            delivery_timeout,
        }
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process every monitor in order.
    pub async fn run(&mut self, monitors: &[Monitor]) -> RunSummary {
        info!(monitors = monitors.len(), "Processing monitors");
        let mut summary = RunSummary::default();

        for monitor in monitors {
            let report = self.run_monitor(monitor).await;
            if let MonitorStatus::Failed { error, .. } = &report.status {
                error!(
                    monitor_id = %report.monitor_id,
                    kind = error.kind(),
                    "Monitor failed: {error}"
                );
            }
            summary.push(report);
        }

        summary
    }

    async fn run_monitor(&mut self, monitor: &Monitor) -> MonitorReport {
        let config = &monitor.config;
        let id = config.id.as_str();

        if !config.enabled {
            debug!(monitor_id = %id, "Skipping disabled monitor");
            return MonitorReport::disabled(id);
        }

        info!(
            monitor_id = %id,
            name = %config.name,
            kind = config.kind.as_str(),
            "Processing monitor"
        );

        let prior = match self.store.load(id, config.kind) {
            Ok(prior) => prior,
            Err(e) => return MonitorReport::failed(id, e.into()),
        };

        let snapshot = match bounded(
            self.fetch_timeout,
            monitor.source.fetch(config.kind, &config.target_url),
            || FetchError::Timeout,
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return MonitorReport::failed(id, e.into()),
        };

        let diff = match reconcile(&snapshot, prior.as_ref(), Utc::now()) {
            Ok(diff) => diff,
            Err(e) => return MonitorReport::failed(id, e.into()),
        };

        match &diff.outcome {
            DiffOutcome::Baseline => info!(
                monitor_id = %id,
                tracked = snapshot.trackable_len(),
                "First run, recording baseline without notifying"
            ),
            DiffOutcome::ReconciliationMiss { missing_post_id } => warn!(
                monitor_id = %id,
                missing_post_id = %missing_post_id,
                "Last seen post not found in thread, re-baselining without notifying"
            ),
            DiffOutcome::EmptySnapshot => warn!(
                monitor_id = %id,
                "Snapshot is empty, keeping previous state"
            ),
            DiffOutcome::Resumed => debug!(
                monitor_id = %id,
                new_items = diff.new_items.len(),
                "Reconciled snapshot"
            ),
        }

        let mut notified = 0;
        let mut delivery_error = None;
        for item in &diff.new_items {
            let sent = bounded(
                self.delivery_timeout,
                monitor.sink.send(&config.name, item),
                || NotifyError::Timeout,
            )
            .await;

            match sent {
                Ok(()) => notified += 1,
                Err(e) => {
                    warn!(
                        monitor_id = %id,
                        item = %item.id(),
                        kind = e.kind(),
                        "Delivery failed, remaining items stay pending: {e}"
                    );
                    delivery_error = Some(e);
                    break;
                }
            }
        }

        if let Some(state) = diff.state_after_delivery(notified) {
            if let Err(e) = self.store.commit(id, state).await {
                // Delivered items will be announced again next run.
                return MonitorReport {
                    monitor_id: id.to_string(),
                    status: MonitorStatus::Failed {
                        error: e.into(),
                        notified,
                    },
                };
            }
        }

        let status = match delivery_error {
            Some(e) => MonitorStatus::Partial {
                notified,
                pending: diff.new_items.len() - notified,
                error: e.into(),
            },
            None => {
                if notified > 0 {
                    info!(monitor_id = %id, notified, "Sent notifications");
                }
                MonitorStatus::Succeeded {
                    outcome: diff.outcome,
                    notified,
                }
            }
        };

        MonitorReport {
            monitor_id: id.to_string(),
            status,
        }
    }
}

/// Await `fut` for at most `limit`, mapping expiry to `on_timeout()`.
async fn bounded<T, E>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(on_timeout()))
}
