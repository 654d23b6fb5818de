//! Synchronization engine
//!
//! This module provides:
//! - Retrieval window planning over long history spans
//! - Per-window reconciliation of remote messages into the local replica
//! - The session engine chaining deletions and retrievals in order

mod engine;
mod reconcile;
mod windows;

pub use engine::{
    SessionState, SyncEngine, SyncEvent, SyncObserver, SyncOptions, SyncOutcome,
};
pub use reconcile::{ReconcileFlags, WindowStats, reconcile_window};
pub use windows::{Window, plan_windows, window_bounds_utc};
