//! Forum access: the [`ForumSource`] capability and its Foroactivo implementation.

mod client;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

use crate::monitors::MonitorKind;
use crate::snapshot::{SectionSnapshot, Snapshot, ThreadSnapshot};

pub use client::ForoactivoClient;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to parse page: {0}")]
    Parse(String),
    #[error("request timed out")]
    Timeout,
}

impl FetchError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_error",
            Self::Network(_) => "network_error",
            Self::Parse(_) => "parse_error",
            Self::Timeout => "fetch_timeout",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Source of forum snapshots.
///
/// Implementations must return stable, forum-assigned identifiers; change
/// detection relies on them entirely.
#[async_trait]
pub trait ForumSource: Send + Sync {
    /// Fetch the thread listing of a section.
    ///
    /// # Errors
    ///
    /// Returns an error on authentication, network or parse failure.
    async fn fetch_section_threads(&self, section_url: &str)
        -> Result<SectionSnapshot, FetchError>;

    /// Fetch the posts of a thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error on authentication, network or parse failure.
    async fn fetch_thread_posts(&self, thread_url: &str) -> Result<ThreadSnapshot, FetchError>;

    /// Fetch the snapshot appropriate for a monitor of `kind`.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying fetch.
    async fn fetch(&self, kind: MonitorKind, target_url: &str) -> Result<Snapshot, FetchError> {
        match kind {
            MonitorKind::SectionWatch => self
                .fetch_section_threads(target_url)
                .await
                .map(Snapshot::Section),
            MonitorKind::ThreadWatch => self
                .fetch_thread_posts(target_url)
                .await
                .map(Snapshot::Thread),
        }
    }
}
