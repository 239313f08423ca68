//! Persisted per-monitor state.

mod models;
mod store;

pub use models::{MonitorState, SectionState, ThreadState};
pub use store::{StateStore, StoreError};
