//! Outbound announcements: the [`NotificationSink`] capability and the
//! Discord webhook implementation.

mod discord;

use async_trait::async_trait;
use thiserror::Error;

use crate::reconcile::NewItem;

pub use discord::{DiscordNotifier, NotifierOptions};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("rate limited (retry after {retry_after_secs:.1}s)")]
    RateLimited { retry_after_secs: f64 },
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("delivery timed out")]
    Timeout,
}

impl NotifyError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Delivery(_) => "delivery_error",
            Self::Timeout => "delivery_timeout",
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Delivery(e.to_string())
        }
    }
}

/// Destination for new-item announcements.
///
/// A failed send is never assumed delivered: the caller leaves the item
/// undelivered in state so it is derived as new on the next run.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Announce one item found by the monitor called `monitor_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the item was not accepted by the destination.
    async fn send(&self, monitor_name: &str, item: &NewItem) -> Result<(), NotifyError>;
}
