//! Offline synchronization engine.
//!
//! A sync pass uploads queued local mutations in creation order, then pulls
//! the server's document collections and merges them into the local store
//! with last-write-wins timestamp comparison. At most one pass runs at a
//! time; a second request while one is in flight is dropped, not deferred.

mod engine;

pub use engine::SyncEngine;

use std::fmt;

/// User-visible sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Result of asking for a sync pass.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another pass was in flight; this request was dropped.
    AlreadyRunning,
    Completed(SyncReport),
}

/// Counters from one completed pass.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    /// Queue entries accepted by the server and acknowledged.
    pub uploaded: usize,
    /// Queue entries that failed and stay queued for the next pass.
    pub upload_failures: usize,
    /// Undecodable queue entries dropped with a warning.
    pub dropped: usize,
    /// Server records inserted locally.
    pub inserted: usize,
    /// Server records that overwrote a stale local copy.
    pub updated: usize,
    /// Server records left alone (local copy same age or newer).
    pub unchanged: usize,
    /// Records or collections skipped because of a download-phase error.
    pub skipped: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.upload_failures == 0 && self.dropped == 0 && self.skipped == 0
    }
}

/// Errors surfaced to the caller of `perform_full_sync`. Per-entry and
/// per-record errors inside the phases are logged and swallowed instead.
#[derive(Debug)]
pub enum SyncError {
    /// The reachability probe failed; no phase ran.
    Offline(String),
    /// The local store failed mid-pass.
    Storage(sqlx::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Offline(e) => write!(f, "server unreachable: {}", e),
            SyncError::Storage(e) => write!(f, "local store error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e)
    }
}
