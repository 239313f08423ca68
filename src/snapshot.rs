//! Point-in-time listings scraped from the forum.
//!
//! These are plain data contracts between the forum client and the
//! reconciler. Identifiers are forum-assigned and must be stable across
//! fetches; everything else is informational.

use chrono::{DateTime, Utc};

/// Order in which a section listing presents its threads.
///
/// The source declares this explicitly so the reconciler never has to guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    NewestFirst,
    OldestFirst,
}

/// A thread row from a section listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub title: String,
    pub author_name: String,
    pub url: String,
    /// Pinned/stickied rows never take part in change detection.
    pub is_pinned: bool,
    /// Best-effort creation time; absent when the page does not expose one.
    pub created_at: Option<DateTime<Utc>>,
}

/// A post from a thread page, in posting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub post_id: String,
    pub author_name: String,
    pub body_preview: String,
    pub url: String,
    /// Timestamp label as rendered by the forum (localized, not parsed).
    pub posted_at: Option<String>,
}

/// Listing of a forum section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSnapshot {
    pub order: ListingOrder,
    pub threads: Vec<ThreadSummary>,
}

impl SectionSnapshot {
    #[must_use]
    pub fn new(order: ListingOrder, threads: Vec<ThreadSummary>) -> Self {
        Self { order, threads }
    }

    /// Non-pinned threads, in listing order.
    pub fn trackable(&self) -> impl Iterator<Item = &ThreadSummary> {
        self.threads.iter().filter(|t| !t.is_pinned)
    }
}

/// Posts of a single thread, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub posts: Vec<PostSummary>,
}

impl ThreadSnapshot {
    #[must_use]
    pub fn new(posts: Vec<PostSummary>) -> Self {
        Self { posts }
    }
}

/// Snapshot of either kind of monitor target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Section(SectionSnapshot),
    Thread(ThreadSnapshot),
}

impl Snapshot {
    /// Number of entries that can take part in change detection.
    #[must_use]
    pub fn trackable_len(&self) -> usize {
        match self {
            Self::Section(s) => s.trackable().count(),
            Self::Thread(t) => t.posts.len(),
        }
    }
}
