//! Forum change-detection monitor library.
//!
//! Polls Foroactivo forum sections and threads, works out which threads or
//! replies are new since the last run by comparing against persisted state,
//! and announces them on Discord webhooks.

// Allow raw string hashes in HTML fixtures
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod forum;
pub mod monitors;
pub mod notify;
pub mod reconcile;
pub mod runner;
pub mod setup;
pub mod snapshot;
pub mod state;
