//! The in-memory reference instance connector.

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{InstanceConnector, SyncReceipt};
use crate::window::SyncWindow;
use parking_lot::RwLock;
use pipesync_batch::{reconcile, Batch, Cell};
use pipesync_core::{Pipe, PipeKeys, PipeParameters};
use pipesync_types::{LogicalType, SentinelPolicy};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

struct StoredPipe {
    parameters: PipeParameters,
    // None between drop_pipe and the next sync.
    table: Option<Batch>,
}

/// A complete instance connector holding every table as a [`Batch`].
///
/// This is the reference backend: it implements the full contract,
/// including diff-based [`sync_pipe`](InstanceConnector::sync_pipe),
/// and the engine's integration tests run against it.
pub struct MemoryInstance {
    name: String,
    policy: SentinelPolicy,
    pipes: RwLock<BTreeMap<String, StoredPipe>>,
}

impl MemoryInstance {
    /// Creates an empty instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: SentinelPolicy::default(),
            pipes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sets the NULL-replacement policy used for join keys.
    pub fn with_policy(mut self, policy: SentinelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total rows currently held for a pipe.
    pub fn row_count(&self, keys: &PipeKeys) -> usize {
        self.pipes
            .read()
            .get(&keys.to_string())
            .and_then(|p| p.table.as_ref())
            .map_or(0, Batch::num_rows)
    }

    fn key(keys: &PipeKeys) -> String {
        keys.to_string()
    }

    /// The policy for one pipe: pipes that forbid NULL in join columns
    /// run with NULL matching disabled.
    fn pipe_policy(&self, pipe: &Pipe) -> SentinelPolicy {
        if pipe.parameters.null_indices {
            self.policy.clone()
        } else {
            self.policy.clone().without_null_matching()
        }
    }
}

/// Builds the join key for one row, substituting the sentinel token for
/// NULL so NULL keys collide with each other instead of with values.
/// `None` when the policy forbids NULL matching and a key is NULL.
fn row_key(
    batch: &Batch,
    row: usize,
    join_cols: &[&str],
    policy: &SentinelPolicy,
) -> Option<String> {
    let mut parts = Vec::with_capacity(join_cols.len());
    for col in join_cols {
        let cell = batch.cell(row, col).unwrap_or(&Cell::Null);
        if cell.is_null() {
            if !policy.match_nulls {
                return None;
            }
            let dtype = batch
                .column(col)
                .and_then(|c| c.dtype)
                .unwrap_or(LogicalType::String);
            parts.push(policy.key_token(&dtype));
        } else {
            parts.push(cell.canonical_string());
        }
    }
    Some(parts.join("\u{1f}"))
}

/// Aligns two schemas: columns present on one side only are added to
/// the other with NULL backfill.
fn align_columns(table: &mut Batch, incoming: &mut Batch) {
    for (name, dtype) in incoming.dtypes() {
        if !table.has_column(&name) {
            table.add_column(&name, Some(dtype));
        }
    }
    let incoming_missing: Vec<(String, Option<LogicalType>)> = table
        .columns()
        .iter()
        .filter(|c| !incoming.has_column(&c.name))
        .map(|c| (c.name.clone(), c.dtype))
        .collect();
    for (name, dtype) in incoming_missing {
        incoming.add_column(&name, dtype);
    }
}

impl InstanceConnector for MemoryInstance {
    fn register_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
        pipe.validate()?;
        let mut pipes = self.pipes.write();
        let key = Self::key(&pipe.keys);
        if pipes.contains_key(&key) {
            return Err(ConnectorError::AlreadyRegistered { keys: key });
        }
        debug!(pipe = %pipe.keys, instance = %self.name, "registering pipe");
        pipes.insert(
            key,
            StoredPipe {
                parameters: pipe.parameters.clone(),
                table: None,
            },
        );
        Ok(())
    }

    fn edit_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
        pipe.validate()?;
        let mut pipes = self.pipes.write();
        let stored = pipes
            .get_mut(&Self::key(&pipe.keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(&pipe.keys))?;
        stored.parameters = pipe.parameters.clone();
        Ok(())
    }

    fn delete_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
        let mut pipes = self.pipes.write();
        pipes
            .remove(&Self::key(keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(keys))?;
        Ok(())
    }

    fn drop_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
        let mut pipes = self.pipes.write();
        let stored = pipes
            .get_mut(&Self::key(keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(keys))?;
        stored.table = None;
        Ok(())
    }

    fn pipe_exists(&self, keys: &PipeKeys) -> ConnectorResult<bool> {
        Ok(self.pipes.read().contains_key(&Self::key(keys)))
    }

    fn get_pipe_attributes(&self, keys: &PipeKeys) -> ConnectorResult<PipeParameters> {
        self.pipes
            .read()
            .get(&Self::key(keys))
            .map(|p| p.parameters.clone())
            .ok_or_else(|| ConnectorError::pipe_not_found(keys))
    }

    fn get_pipe_columns_types(
        &self,
        keys: &PipeKeys,
    ) -> ConnectorResult<BTreeMap<String, LogicalType>> {
        let pipes = self.pipes.read();
        let stored = pipes
            .get(&Self::key(keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(keys))?;
        Ok(stored.table.as_ref().map(Batch::dtypes).unwrap_or_default())
    }

    fn get_sync_time(&self, pipe: &Pipe) -> ConnectorResult<Option<Cell>> {
        let pipes = self.pipes.read();
        let stored = pipes
            .get(&Self::key(&pipe.keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(&pipe.keys))?;
        let Some(table) = &stored.table else {
            return Ok(None);
        };
        let axis = stored
            .parameters
            .columns
            .datetime
            .as_deref()
            .or(stored.parameters.columns.primary.as_deref());
        let Some(axis) = axis else {
            return Ok(None);
        };
        let Some(column) = table.column(axis) else {
            return Ok(None);
        };
        let mut newest: Option<&Cell> = None;
        for cell in &column.cells {
            if cell.is_null() {
                continue;
            }
            let replace = match newest {
                None => true,
                Some(current) => {
                    crate::window::axis_cmp(cell, current) == Some(std::cmp::Ordering::Greater)
                }
            };
            if replace {
                newest = Some(cell);
            }
        }
        Ok(newest.cloned())
    }

    fn sync_pipe(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        _window: &SyncWindow,
        _chunksize: usize,
    ) -> ConnectorResult<SyncReceipt> {
        if batch.is_empty() {
            return Ok(SyncReceipt::new(0, 0));
        }
        let join_cols: Vec<&str> = pipe.join_columns();
        let policy = self.pipe_policy(pipe);
        let mut pipes = self.pipes.write();
        let stored = pipes
            .get_mut(&Self::key(&pipe.keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(&pipe.keys))?;

        let table = stored.table.get_or_insert_with(|| batch.take_rows(&[]));
        let mut incoming = batch.clone();
        align_columns(table, &mut incoming);

        let diff = reconcile(table, &incoming, &join_cols, &policy);
        let inserted = diff.unseen.num_rows() as u64;
        let updated = diff.update.num_rows() as u64;

        // Apply updates before appending, so fresh inserts are never
        // re-matched against themselves.
        if !diff.update.is_empty() {
            let join_cols: Vec<&str> = join_cols
                .iter()
                .copied()
                .filter(|c| table.has_column(c) && diff.update.has_column(c))
                .collect();
            let mut index: HashMap<String, usize> = HashMap::new();
            for row in 0..table.num_rows() {
                if let Some(key) = row_key(table, row, &join_cols, &policy) {
                    index.entry(key).or_insert(row);
                }
            }
            let shared: Vec<String> = diff
                .update
                .column_names()
                .into_iter()
                .filter(|c| table.has_column(c))
                .map(String::from)
                .collect();
            for row in 0..diff.update.num_rows() {
                let Some(key) = row_key(&diff.update, row, &join_cols, &policy) else {
                    continue;
                };
                if let Some(&target_row) = index.get(&key) {
                    for name in &shared {
                        let value = diff.update.cell(row, name).cloned().unwrap_or(Cell::Null);
                        if let Some(column) = table.column_mut(name) {
                            column.cells[target_row] = value;
                        }
                    }
                }
            }
        }

        table.append(&diff.unseen)?;
        debug!(pipe = %pipe.keys, inserted, updated, "memory sync applied");
        Ok(SyncReceipt::new(inserted, updated))
    }

    fn insert_pipe_rows(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        _chunksize: usize,
    ) -> ConnectorResult<u64> {
        let mut pipes = self.pipes.write();
        let stored = pipes
            .get_mut(&Self::key(&pipe.keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(&pipe.keys))?;
        let table = stored.table.get_or_insert_with(|| batch.take_rows(&[]));
        let mut incoming = batch.clone();
        align_columns(table, &mut incoming);
        table.append(&incoming)?;
        Ok(batch.num_rows() as u64)
    }

    fn get_pipe_data(
        &self,
        pipe: &Pipe,
        select_cols: Option<&[&str]>,
        window: &SyncWindow,
    ) -> ConnectorResult<Batch> {
        let pipes = self.pipes.read();
        let stored = pipes
            .get(&Self::key(&pipe.keys))
            .ok_or_else(|| ConnectorError::pipe_not_found(&pipe.keys))?;
        let Some(table) = &stored.table else {
            return Ok(Batch::default());
        };

        let mut result = if window.is_open() {
            table.clone()
        } else {
            let axis = stored.parameters.columns.datetime.as_deref();
            match axis.and_then(|a| table.column(a)) {
                Some(column) => {
                    let kept: Vec<usize> = column
                        .cells
                        .iter()
                        .enumerate()
                        .filter(|(_, cell)| window.contains(cell))
                        .map(|(i, _)| i)
                        .collect();
                    table.take_rows(&kept)
                }
                None => table.clone(),
            }
        };
        if let Some(cols) = select_cols {
            result = result.select(cols)?;
        }
        Ok(result)
    }
}
