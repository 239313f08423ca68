use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::MonitorKind;

/// Persisted state of a section monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionState {
    /// Thread ids already accounted for, oldest first-seen first.
    pub seen_thread_ids: Vec<String>,
    pub last_checked_at: DateTime<Utc>,
    pub total_threads: u64,
}

impl SectionState {
    /// Drop the oldest first-seen ids until at most `cap` remain.
    ///
    /// Returns the number of evicted ids.
    pub fn enforce_cap(&mut self, cap: usize) -> usize {
        let excess = self.seen_thread_ids.len().saturating_sub(cap);
        if excess > 0 {
            self.seen_thread_ids.drain(..excess);
            self.total_threads = self.seen_thread_ids.len() as u64;
        }
        excess
    }
}

/// Persisted state of a thread monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadState {
    /// Id of the newest post already accounted for; `None` until a baseline exists.
    pub last_post_id: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    pub total_posts_seen: u64,
}

/// Persisted state of one monitor.
///
/// On disk the record carries no tag; the variant is implied by the kind of
/// the monitor that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MonitorState {
    Section(SectionState),
    Thread(ThreadState),
}

impl MonitorState {
    #[must_use]
    pub fn kind(&self) -> MonitorKind {
        match self {
            Self::Section(_) => MonitorKind::SectionWatch,
            Self::Thread(_) => MonitorKind::ThreadWatch,
        }
    }

    /// Decode a raw record as the variant expected for `kind`.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when the record does not have that
    /// variant's shape.
    pub fn from_value(
        kind: MonitorKind,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        match kind {
            MonitorKind::SectionWatch => serde_json::from_value(value).map(Self::Section),
            MonitorKind::ThreadWatch => serde_json::from_value(value).map(Self::Thread),
        }
    }
}
