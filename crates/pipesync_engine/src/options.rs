//! Per-sync options and the retry policy.

use pipesync_batch::Cell;
use std::time::Duration;

/// Default rows per chunk.
pub const DEFAULT_CHUNKSIZE: usize = 900;

/// How one sync call should behave.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Inclusive lower bound on the time axis. `None` derives it from
    /// the last sync time minus the pipe's backtrack window.
    pub begin: Option<Cell>,
    /// Exclusive upper bound on the time axis.
    pub end: Option<Cell>,
    /// Rows per chunk.
    pub chunksize: usize,
    /// Worker threads for independent chunks. Capped by the backend's
    /// concurrency headroom.
    pub workers: usize,
    /// Retry policy for apply-phase failures.
    pub retry: RetryConfig,
    /// When false, the diff is skipped and every row is treated unseen.
    pub check_existing: bool,
}

impl SyncOptions {
    /// Sets the inclusive lower bound.
    pub fn with_begin(mut self, begin: Cell) -> Self {
        self.begin = Some(begin);
        self
    }

    /// Sets the exclusive upper bound.
    pub fn with_end(mut self, end: Cell) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the chunk size.
    pub fn with_chunksize(mut self, chunksize: usize) -> Self {
        self.chunksize = chunksize;
        self
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Disables the diff: everything is inserted as unseen.
    pub fn without_check_existing(mut self) -> Self {
        self.check_existing = false;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            begin: None,
            end: None,
            chunksize: DEFAULT_CHUNKSIZE,
            workers: 1,
            retry: RetryConfig::default(),
            check_existing: true,
        }
    }
}

/// Retry behavior for apply-phase failures: a fixed number of attempts
/// with a fixed inter-attempt delay.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a policy with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_millis(100),
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Sets the inter-attempt delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let options = SyncOptions::default()
            .with_chunksize(100)
            .with_workers(4)
            .without_check_existing();
        assert_eq!(options.chunksize, 100);
        assert_eq!(options.workers, 4);
        assert!(!options.check_existing);
        assert!(SyncOptions::default().check_existing);
    }

    #[test]
    fn retry_budget_is_at_least_one() {
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }
}
