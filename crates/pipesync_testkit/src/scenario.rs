//! Scenario harnesses for end-to-end sync tests.

use pipesync_batch::Batch;
use pipesync_connector::{InstanceConnector, MemoryInstance, SyncWindow};
use pipesync_core::Pipe;

/// Row counts observed after each pass of a repeated sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwicePassCounts {
    /// Rows after the first sync.
    pub after_first: usize,
    /// Rows after syncing the identical batch again.
    pub after_second: usize,
}

/// Syncs the same batch twice into a fresh in-memory instance and
/// reports the row counts, for idempotence checks.
pub fn sync_twice(pipe: &Pipe, batch: &Batch) -> TwicePassCounts {
    let instance = MemoryInstance::new("scenario");
    instance.register_pipe(pipe).expect("fresh registration");

    instance
        .sync_pipe(pipe, batch, &SyncWindow::open(), 100)
        .expect("first sync");
    let after_first = instance.row_count(&pipe.keys);

    instance
        .sync_pipe(pipe, batch, &SyncWindow::open(), 100)
        .expect("second sync");
    let after_second = instance.row_count(&pipe.keys);

    TwicePassCounts {
        after_first,
        after_second,
    }
}
