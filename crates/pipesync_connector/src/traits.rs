//! The connector contracts.

use crate::error::ConnectorResult;
use crate::window::SyncWindow;
use pipesync_batch::{Batch, Cell};
use pipesync_core::{Pipe, PipeKeys, PipeParameters};
use pipesync_types::{Flavor, LogicalType};
use std::collections::BTreeMap;

/// What one `sync_pipe` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReceipt {
    /// Rows inserted into the target.
    pub inserted: u64,
    /// Rows updated in place.
    pub updated: u64,
    /// Human-readable outcome summary.
    pub message: String,
}

impl SyncReceipt {
    /// Builds a receipt with the standard summary message.
    pub fn new(inserted: u64, updated: u64) -> Self {
        Self {
            inserted,
            updated,
            message: format!("inserted {inserted}, updated {updated}"),
        }
    }

    /// Folds another receipt's counts into this one.
    pub fn absorb(&mut self, other: &SyncReceipt) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.message = format!("inserted {}, updated {}", self.inserted, self.updated);
    }
}

/// A backend that stores pipes: their metadata and their rows.
///
/// Capabilities a backend lacks return
/// [`ConnectorError::Unsupported`](crate::ConnectorError::Unsupported),
/// never a silent no-op.
pub trait InstanceConnector: Send + Sync {
    /// The backend flavor, when the instance is SQL-backed.
    fn flavor(&self) -> Option<Flavor> {
        None
    }

    /// Persists a new pipe's metadata (and target table, when its dtypes
    /// are already declared). Fails if the keys are taken.
    fn register_pipe(&self, pipe: &Pipe) -> ConnectorResult<()>;

    /// Replaces a registered pipe's parameter document.
    fn edit_pipe(&self, pipe: &Pipe) -> ConnectorResult<()>;

    /// Removes a pipe's metadata and drops its target table.
    fn delete_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()>;

    /// Drops a pipe's target table, keeping the registration.
    fn drop_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()>;

    /// Whether a pipe is registered under these keys.
    fn pipe_exists(&self, keys: &PipeKeys) -> ConnectorResult<bool>;

    /// Fetches the persisted parameter document.
    fn get_pipe_attributes(&self, keys: &PipeKeys) -> ConnectorResult<PipeParameters>;

    /// The physical columns and canonical dtypes of the target table.
    fn get_pipe_columns_types(
        &self,
        keys: &PipeKeys,
    ) -> ConnectorResult<BTreeMap<String, LogicalType>>;

    /// The newest value on the pipe's axis (datetime role, else
    /// primary), or `None` when the target is empty or axis-less.
    fn get_sync_time(&self, pipe: &Pipe) -> ConnectorResult<Option<Cell>>;

    /// Diffs the batch against the target within the window and applies
    /// the result: unseen rows inserted, changed rows updated.
    fn sync_pipe(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        window: &SyncWindow,
        chunksize: usize,
    ) -> ConnectorResult<SyncReceipt>;

    /// Inserts rows without diffing. Used when the caller already knows
    /// every row is unseen.
    fn insert_pipe_rows(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        chunksize: usize,
    ) -> ConnectorResult<u64>;

    /// Reads target rows, optionally restricted to named columns and a
    /// window on the datetime axis.
    fn get_pipe_data(
        &self,
        pipe: &Pipe,
        select_cols: Option<&[&str]>,
        window: &SyncWindow,
    ) -> ConnectorResult<Batch>;
}

/// What a fetch produced.
pub enum FetchPayload {
    /// The whole result at once.
    Batch(Batch),
    /// An incremental sequence of batches.
    Chunks(Box<dyn Iterator<Item = ConnectorResult<Batch>> + Send>),
    /// The source drove the chunk hook itself; the flag reports whether
    /// every hook call succeeded.
    Accepted(bool),
}

/// A callback fed incremental batches during a hook-driven fetch.
pub type ChunkHook<'a> = &'a mut dyn FnMut(Batch) -> ConnectorResult<()>;

/// A backend pipes pull rows from.
pub trait SourceConnector: Send + Sync {
    /// Produces the rows for a pipe within a window.
    ///
    /// Sources that stream may either return [`FetchPayload::Chunks`]
    /// or push batches through `chunk_hook` and return
    /// [`FetchPayload::Accepted`].
    fn fetch(
        &self,
        pipe: &Pipe,
        window: &SyncWindow,
        chunk_hook: Option<ChunkHook<'_>>,
    ) -> ConnectorResult<FetchPayload>;
}

/// The seam a real database driver implements.
///
/// Everything above this trait is pure statement rendering; everything
/// below it is the driver's concern.
pub trait SqlClient: Send + Sync {
    /// The backend's dialect.
    fn flavor(&self) -> Flavor;

    /// Runs a statement, returning the affected row count.
    fn execute(&self, sql: &str) -> ConnectorResult<u64>;

    /// Runs a query, returning its rows.
    fn query(&self, sql: &str) -> ConnectorResult<Batch>;
}
