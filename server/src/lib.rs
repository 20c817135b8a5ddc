//! Homegame - Server
//!
//! The authoritative multi-table server: per-table coordinator, timer
//! scheduler, WebSocket connection registry, store adapter, and the thin
//! axum transport over them.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod coordinator;
pub mod http;
pub mod models;
pub mod registry;
pub mod store;
pub mod timer;

pub use coordinator::{Coordinator, ServerError};

/// Current unix time in seconds. All deadlines and pause accounting use
/// this representation, matching the persisted blob format.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
