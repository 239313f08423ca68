//! Change detection between a fresh snapshot and a monitor's persisted state.
//!
//! The reconciler is pure: it never performs I/O and never mutates the prior
//! state. It returns the items to announce, in announcement order, together
//! with the state to commit once they have all been delivered.
//!
//! Two anti-flood policies shape every result:
//!
//! - A monitor without prior state records the whole snapshot as a baseline
//!   and announces nothing.
//! - A thread whose last-seen post has vanished from the snapshot is
//!   re-baselined on its newest post, again announcing nothing.
//!
//! An empty snapshot (including a section listing with only pinned rows)
//! leaves the prior state untouched.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::monitors::MonitorKind;
use crate::snapshot::{
    ListingOrder, PostSummary, SectionSnapshot, Snapshot, ThreadSnapshot, ThreadSummary,
};
use crate::state::{MonitorState, SectionState, ThreadState};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("snapshot is for a {snapshot} monitor but prior state is for a {state} monitor")]
    KindMismatch {
        snapshot: &'static str,
        state: &'static str,
    },
}

/// Which kind of announcement an item produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewThread,
    NewReply,
}

/// A newly detected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewItem {
    Thread(ThreadSummary),
    Post(PostSummary),
}

impl NewItem {
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Thread(_) => NotificationKind::NewThread,
            Self::Post(_) => NotificationKind::NewReply,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Thread(t) => &t.thread_id,
            Self::Post(p) => &p.post_id,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Thread(t) => &t.url,
            Self::Post(p) => &p.url,
        }
    }
}

/// How a snapshot related to the prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No prior state; the snapshot was recorded without announcements.
    Baseline,
    /// Prior state was found and new items (possibly none) were derived from it.
    Resumed,
    /// The last-seen post is gone; the thread was re-baselined.
    ReconciliationMiss { missing_post_id: String },
    /// The snapshot had nothing trackable; prior state carries forward.
    EmptySnapshot,
}

impl DiffOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Resumed => "resumed",
            Self::ReconciliationMiss { .. } => "reconciliation_miss",
            Self::EmptySnapshot => "empty_snapshot",
        }
    }
}

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// Items to announce, oldest first.
    pub new_items: Vec<NewItem>,
    /// State to commit after every item is delivered; `None` means keep the
    /// prior state as it is.
    pub next_state: Option<MonitorState>,
    pub outcome: DiffOutcome,
}

impl Diff {
    fn unchanged(outcome: DiffOutcome) -> Self {
        Self {
            new_items: Vec::new(),
            next_state: None,
            outcome,
        }
    }

    /// State to commit when only the first `delivered` items went out.
    ///
    /// Undelivered items are left out of the returned state so the next run
    /// derives them as new again.
    #[must_use]
    pub fn state_after_delivery(&self, delivered: usize) -> Option<MonitorState> {
        if delivered >= self.new_items.len() {
            return self.next_state.clone();
        }

        let pending = &self.new_items[delivered..];
        match self.next_state.as_ref()? {
            MonitorState::Section(next) => {
                let pending_ids: HashSet<&str> = pending.iter().map(NewItem::id).collect();
                let seen_thread_ids: Vec<String> = next
                    .seen_thread_ids
                    .iter()
                    .filter(|id| !pending_ids.contains(id.as_str()))
                    .cloned()
                    .collect();
                Some(MonitorState::Section(SectionState {
                    total_threads: seen_thread_ids.len() as u64,
                    seen_thread_ids,
                    last_checked_at: next.last_checked_at,
                }))
            }
            MonitorState::Thread(next) => {
                // Nothing delivered: the prior marker still stands.
                let last_delivered = self.new_items[..delivered].last()?;
                Some(MonitorState::Thread(ThreadState {
                    last_post_id: Some(last_delivered.id().to_string()),
                    last_checked_at: next.last_checked_at,
                    total_posts_seen: next
                        .total_posts_seen
                        .saturating_sub(pending.len() as u64),
                }))
            }
        }
    }
}

/// Reconcile any snapshot against the prior state of its monitor.
///
/// # Errors
///
/// Returns an error if the prior state belongs to the other monitor kind.
pub fn reconcile(
    snapshot: &Snapshot,
    prior: Option<&MonitorState>,
    now: DateTime<Utc>,
) -> Result<Diff, ReconcileError> {
    match (snapshot, prior) {
        (Snapshot::Section(s), None) => Ok(reconcile_section(s, None, now)),
        (Snapshot::Section(s), Some(MonitorState::Section(p))) => {
            Ok(reconcile_section(s, Some(p), now))
        }
        (Snapshot::Thread(t), None) => Ok(reconcile_thread(t, None, now)),
        (Snapshot::Thread(t), Some(MonitorState::Thread(p))) => {
            Ok(reconcile_thread(t, Some(p), now))
        }
        (_, Some(state)) => {
            let snapshot_kind = match snapshot {
                Snapshot::Section(_) => MonitorKind::SectionWatch,
                Snapshot::Thread(_) => MonitorKind::ThreadWatch,
            };
            Err(ReconcileError::KindMismatch {
                snapshot: snapshot_kind.as_str(),
                state: state.kind().as_str(),
            })
        }
    }
}

/// Detect new threads in a section listing.
#[must_use]
pub fn reconcile_section(
    snapshot: &SectionSnapshot,
    prior: Option<&SectionState>,
    now: DateTime<Utc>,
) -> Diff {
    let ascending = chronological(snapshot);
    if ascending.is_empty() {
        return Diff::unchanged(DiffOutcome::EmptySnapshot);
    }

    let known: HashSet<&str> = prior
        .map(|p| p.seen_thread_ids.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let mut seen_thread_ids = prior.map(|p| p.seen_thread_ids.clone()).unwrap_or_default();
    let mut recorded = HashSet::new();
    let mut new_items = Vec::new();

    for thread in ascending {
        let id = thread.thread_id.as_str();
        if known.contains(id) || !recorded.insert(id) {
            continue;
        }
        seen_thread_ids.push(id.to_string());
        if prior.is_some() {
            new_items.push(NewItem::Thread(thread.clone()));
        }
    }

    let next_state = MonitorState::Section(SectionState {
        total_threads: seen_thread_ids.len() as u64,
        seen_thread_ids,
        last_checked_at: now,
    });

    Diff {
        new_items,
        next_state: Some(next_state),
        outcome: if prior.is_some() {
            DiffOutcome::Resumed
        } else {
            DiffOutcome::Baseline
        },
    }
}

/// Non-pinned threads ordered oldest first.
///
/// Creation timestamps decide the order when every row has one; otherwise
/// (or on ties) the listing order, normalized to ascending, is used.
fn chronological(snapshot: &SectionSnapshot) -> Vec<&ThreadSummary> {
    let mut threads: Vec<&ThreadSummary> = snapshot.trackable().collect();
    if snapshot.order == ListingOrder::NewestFirst {
        threads.reverse();
    }
    if threads.iter().all(|t| t.created_at.is_some()) {
        // Stable sort keeps scrape order for equal timestamps
        threads.sort_by_key(|t| t.created_at);
    }
    threads
}

/// Detect new replies in a thread.
#[must_use]
pub fn reconcile_thread(
    snapshot: &ThreadSnapshot,
    prior: Option<&ThreadState>,
    now: DateTime<Utc>,
) -> Diff {
    let Some(newest) = snapshot.posts.last() else {
        return Diff::unchanged(DiffOutcome::EmptySnapshot);
    };

    let prior_total = prior.map_or(0, |p| p.total_posts_seen);
    let marker = prior.and_then(|p| p.last_post_id.as_deref());

    let (new_items, outcome) = match marker {
        None => (Vec::new(), DiffOutcome::Baseline),
        Some(marker) => match snapshot.posts.iter().rposition(|p| p.post_id == marker) {
            Some(index) => (
                snapshot.posts[index + 1..]
                    .iter()
                    .cloned()
                    .map(NewItem::Post)
                    .collect(),
                DiffOutcome::Resumed,
            ),
            None => (
                Vec::new(),
                DiffOutcome::ReconciliationMiss {
                    missing_post_id: marker.to_string(),
                },
            ),
        },
    };

    let next_state = MonitorState::Thread(ThreadState {
        last_post_id: Some(newest.post_id.clone()),
        last_checked_at: now,
        total_posts_seen: prior_total + new_items.len() as u64,
    });

    Diff {
        new_items,
        next_state: Some(next_state),
        outcome,
    }
}
