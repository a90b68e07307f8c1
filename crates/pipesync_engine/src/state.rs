//! Sync state machine, stats, and the outcome surface.

use std::time::{Duration, Instant};

/// Where a sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The pipe has never been registered on the instance.
    Unregistered,
    /// Auto-registration is in progress.
    Registering,
    /// Rows are being pulled from the source.
    Fetching,
    /// Values are being coerced to the declared dtypes.
    Coercing,
    /// The batch is being partitioned against the target.
    Diffing,
    /// The diff is being written to the target.
    Applying,
    /// The last sync finished cleanly.
    Succeeded,
    /// Waiting out the retry delay after an apply failure.
    Retrying,
    /// The last sync failed terminally.
    Failed,
}

impl SyncState {
    /// Whether a sync is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Registering
                | SyncState::Fetching
                | SyncState::Coercing
                | SyncState::Diffing
                | SyncState::Applying
                | SyncState::Retrying
        )
    }

    /// Whether this is a resting state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Unregistered | SyncState::Succeeded | SyncState::Failed
        )
    }
}

/// Cumulative counters across syncs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Syncs that reached a terminal state.
    pub syncs_completed: u64,
    /// Rows inserted across all syncs.
    pub rows_inserted: u64,
    /// Rows updated across all syncs.
    pub rows_updated: u64,
    /// Retry attempts taken.
    pub retries: u64,
    /// When the last successful sync finished.
    pub last_sync_time: Option<Instant>,
    /// The last terminal error message.
    pub last_error: Option<String>,
}

/// What one sync call did.
///
/// This is the whole public result surface: a success flag and a
/// message, plus counts. Errors never escape `sync` as panics or `Err`.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Whether the sync reached `Succeeded`.
    pub success: bool,
    /// Human-readable summary or failure reason.
    pub message: String,
    /// Rows inserted.
    pub inserted: u64,
    /// Rows updated.
    pub updated: u64,
    /// The terminal state.
    pub state: SyncState,
    /// Wall-clock duration of the whole call, retries included.
    pub duration: Duration,
}

impl SyncOutcome {
    /// A failure outcome with the given reason.
    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            inserted: 0,
            updated: 0,
            state: SyncState::Failed,
            duration,
        }
    }
}
