//! The sync orchestrator.

use crate::error::{EngineError, EngineResult};
use crate::options::SyncOptions;
use crate::state::{SyncOutcome, SyncState, SyncStats};
use parking_lot::{Mutex, RwLock};
use pipesync_batch::coerce::{enforce, infer_dtypes};
use pipesync_batch::{Batch, Cell};
use pipesync_connector::{
    ConnectorError, ConnectorResult, FetchPayload, InstanceConnector, SourceConnector,
    SyncReceipt, SyncWindow,
};
use pipesync_core::{Pipe, PipeParameters};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a sync's rows come from.
pub enum SyncSource {
    /// Rows supplied directly.
    Batch(Batch),
    /// An incremental sequence of batches, consumed in order.
    Chunks(Box<dyn Iterator<Item = ConnectorResult<Batch>> + Send>),
    /// A pull source; the engine computes the window and fetches.
    Fetch(Arc<dyn SourceConnector>),
}

impl From<Batch> for SyncSource {
    fn from(batch: Batch) -> Self {
        Self::Batch(batch)
    }
}

/// Shared accumulation for one sync's chunk pipeline.
///
/// Chunks are coerced and applied as they arrive, so the evolving
/// parameters and the running receipt live behind locks that the
/// workers share.
struct ChunkPipeline {
    params: Mutex<PipeParameters>,
    receipt: Mutex<SyncReceipt>,
    applied: AtomicUsize,
}

/// Orchestrates syncs against one instance connector.
///
/// The engine owns the state machine, the retry loop, and the chunk
/// worker pool; the diff and the apply strategies live behind the
/// connector seam.
pub struct SyncEngine<I: InstanceConnector> {
    instance: Arc<I>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<I: InstanceConnector> SyncEngine<I> {
    /// Creates an engine over an instance connector.
    pub fn new(instance: I) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    /// Creates an engine over a shared instance connector.
    pub fn from_arc(instance: Arc<I>) -> Self {
        Self {
            instance,
            state: RwLock::new(SyncState::Unregistered),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// The instance connector.
    pub fn instance(&self) -> &Arc<I> {
        &self.instance
    }

    /// The current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// A snapshot of the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Stops scheduling chunks that have not started yet. Chunks already
    /// in flight run to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: SyncState) {
        debug!(?state, "sync state");
        *self.state.write() = state;
    }

    /// Runs one sync to a terminal state.
    ///
    /// Never returns an error and never panics on backend failure: every
    /// failure is folded into the `(success, message)` outcome.
    pub fn sync(&self, pipe: &Pipe, source: SyncSource, options: &SyncOptions) -> SyncOutcome {
        let start = Instant::now();
        self.cancelled.store(false, Ordering::SeqCst);

        let result = self.run(pipe, source, options);
        let duration = start.elapsed();
        let mut stats = self.stats.write();
        stats.syncs_completed += 1;

        match result {
            Ok(receipt) => {
                stats.rows_inserted += receipt.inserted;
                stats.rows_updated += receipt.updated;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                drop(stats);
                self.set_state(SyncState::Succeeded);
                info!(
                    pipe = %pipe.keys,
                    inserted = receipt.inserted,
                    updated = receipt.updated,
                    "sync succeeded"
                );
                SyncOutcome {
                    success: true,
                    message: receipt.message,
                    inserted: receipt.inserted,
                    updated: receipt.updated,
                    state: SyncState::Succeeded,
                    duration,
                }
            }
            Err(error) => {
                let message = error.to_string();
                stats.last_error = Some(message.clone());
                drop(stats);
                self.set_state(SyncState::Failed);
                warn!(pipe = %pipe.keys, %message, "sync failed");
                SyncOutcome::failed(message, duration)
            }
        }
    }

    /// Spawns the sync on a background thread. Fire-and-forget: the
    /// outcome is delivered through `on_complete`.
    pub fn sync_background<F>(
        self: &Arc<Self>,
        pipe: Pipe,
        source: SyncSource,
        options: SyncOptions,
        on_complete: F,
    ) -> std::thread::JoinHandle<()>
    where
        I: 'static,
        F: FnOnce(SyncOutcome) + Send + 'static,
    {
        let engine = Arc::clone(self);
        std::thread::spawn(move || {
            let outcome = engine.sync(&pipe, source, &options);
            on_complete(outcome);
        })
    }

    fn run(
        &self,
        pipe: &Pipe,
        source: SyncSource,
        options: &SyncOptions,
    ) -> EngineResult<SyncReceipt> {
        pipe.validate()
            .map_err(|e| EngineError::configuration(e.to_string()))?;

        // Auto-registration; a failure here is terminal.
        self.set_state(SyncState::Registering);
        let registered = self
            .instance
            .pipe_exists(&pipe.keys)
            .map_err(EngineError::from_fetch)?;
        if !registered {
            self.instance
                .register_pipe(pipe)
                .map_err(|e| EngineError::configuration(e.to_string()))?;
            debug!(pipe = %pipe.keys, "auto-registered pipe");
        }

        self.set_state(SyncState::Fetching);
        let window = self.fetch_window(pipe, options)?;
        let chunksize = options.chunksize.max(1);

        let pipeline = ChunkPipeline {
            params: Mutex::new(pipe.parameters.clone()),
            receipt: Mutex::new(SyncReceipt::new(0, 0)),
            applied: AtomicUsize::new(0),
        };

        match source {
            SyncSource::Batch(batch) if batch.is_empty() => {}
            SyncSource::Batch(batch) => {
                let chunks = batch.chunks(chunksize).into_iter().map(Ok);
                self.drain(pipe, &pipeline, chunks, &window, options)?;
            }
            SyncSource::Chunks(iterator) => {
                let chunks = iterator.map(|chunk| chunk.map_err(EngineError::from_fetch));
                self.drain(pipe, &pipeline, chunks, &window, options)?;
            }
            SyncSource::Fetch(source) => {
                // Hook-pushed batches are applied as they arrive; the
                // classified failure is kept aside because the hook can
                // only return a connector error.
                let mut hook_failure: Option<EngineError> = None;
                let mut hook = |batch: Batch| -> ConnectorResult<()> {
                    match self.process_chunk(pipe, &pipeline, batch, &window, options) {
                        Ok(()) => Ok(()),
                        Err(error) => {
                            let message = error.to_string();
                            hook_failure = Some(error);
                            Err(ConnectorError::backend(message, false))
                        }
                    }
                };
                let payload = source.fetch(pipe, &window, Some(&mut hook));
                if let Some(error) = hook_failure {
                    return Err(error);
                }
                match payload.map_err(EngineError::from_fetch)? {
                    FetchPayload::Batch(batch) if batch.is_empty() => {}
                    FetchPayload::Batch(batch) => {
                        let chunks = batch.chunks(chunksize).into_iter().map(Ok);
                        self.drain(pipe, &pipeline, chunks, &window, options)?;
                    }
                    FetchPayload::Chunks(iterator) => {
                        let chunks =
                            iterator.map(|chunk| chunk.map_err(EngineError::from_fetch));
                        self.drain(pipe, &pipeline, chunks, &window, options)?;
                    }
                    FetchPayload::Accepted(true) => {}
                    FetchPayload::Accepted(false) => {
                        return Err(EngineError::Connection {
                            message: "source rejected the fetch".into(),
                            retryable: false,
                        })
                    }
                }
            }
        }

        // Persist any dtypes that evolved during coercion.
        let params = pipeline.params.into_inner();
        if params != pipe.parameters {
            let mut edited = pipe.clone();
            edited.parameters = params;
            self.instance
                .edit_pipe(&edited)
                .map_err(EngineError::from_apply)?;
        }

        if pipeline.applied.load(Ordering::SeqCst) == 0 {
            return Ok(SyncReceipt {
                inserted: 0,
                updated: 0,
                message: "no rows to sync".into(),
            });
        }
        Ok(pipeline.receipt.into_inner())
    }

    /// Computes the fetch window: an explicit `begin` wins, otherwise
    /// the last sync time backed off by the pipe's backtrack minutes.
    fn fetch_window(&self, pipe: &Pipe, options: &SyncOptions) -> EngineResult<SyncWindow> {
        let mut window = SyncWindow::open();
        if let Some(end) = &options.end {
            window = window.with_end(end.clone());
        }
        if let Some(begin) = &options.begin {
            return Ok(window.with_begin(begin.clone()));
        }

        let last = self
            .instance
            .get_sync_time(pipe)
            .map_err(EngineError::from_fetch)?;
        let Some(last) = last else {
            return Ok(window);
        };
        let backtrack = pipe
            .parameters
            .fetch
            .as_ref()
            .map_or(0, |f| f.backtrack_minutes);
        Ok(window.with_begin(backtrack_cell(last, backtrack)))
    }

    /// Pulls chunks from the stream one at a time on a bounded worker
    /// pool, coercing and applying each as it arrives. The source is
    /// never materialized beyond the chunks the workers currently hold.
    fn drain<It>(
        &self,
        pipe: &Pipe,
        pipeline: &ChunkPipeline,
        chunks: It,
        window: &SyncWindow,
        options: &SyncOptions,
    ) -> EngineResult<()>
    where
        It: Iterator<Item = EngineResult<Batch>> + Send,
    {
        let headroom = self
            .instance
            .flavor()
            .map_or(4, |f| f.concurrency_headroom());
        let workers = options.workers.max(1).min(headroom);

        if workers <= 1 {
            for next in chunks {
                let chunk = next?;
                if self.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                self.process_chunk(pipe, pipeline, chunk, window, options)?;
            }
            return Ok(());
        }

        let chunks = Mutex::new(chunks.fuse());
        let failure: Mutex<Option<EngineError>> = Mutex::new(None);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if failure.lock().is_some() {
                        break;
                    }
                    let next = chunks.lock().next();
                    let chunk = match next {
                        None => break,
                        Some(Ok(chunk)) => chunk,
                        Some(Err(error)) => {
                            failure.lock().get_or_insert(error);
                            break;
                        }
                    };
                    if self.is_cancelled() {
                        failure.lock().get_or_insert(EngineError::Cancelled);
                        break;
                    }
                    if let Err(error) =
                        self.process_chunk(pipe, pipeline, chunk, window, options)
                    {
                        failure.lock().get_or_insert(error);
                        break;
                    }
                });
            }
        });
        match failure.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Coerces and applies one chunk, retrying apply-phase failures per
    /// the retry policy. Only this chunk is re-applied on retry.
    fn process_chunk(
        &self,
        pipe: &Pipe,
        pipeline: &ChunkPipeline,
        mut chunk: Batch,
        window: &SyncWindow,
        options: &SyncOptions,
    ) -> EngineResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.set_state(SyncState::Coercing);
        let params = {
            let mut params = pipeline.params.lock();
            self.coerce_chunk(pipe, &mut params, &mut chunk)?;
            params.clone()
        };

        let mut attempt = 0u32;
        loop {
            self.set_state(SyncState::Diffing);
            match self.apply_one(pipe, &params, &chunk, window, options) {
                Ok(receipt) => {
                    pipeline.receipt.lock().absorb(&receipt);
                    pipeline.applied.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(error)
                    if error.is_retryable() && attempt + 1 < options.retry.max_attempts =>
                {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    self.set_state(SyncState::Retrying);
                    warn!(pipe = %pipe.keys, %error, attempt, "retrying apply");
                    std::thread::sleep(options.retry.delay);
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Coerces one chunk to the declared dtypes, inferring and widening
    /// dtypes for new columns.
    ///
    /// Static pipes reject schema growth: unknown columns are logged
    /// and dropped, the rest of the batch goes through; a batch sharing
    /// no columns with the declared schema is a hard conflict.
    /// Uncoercible cells in value columns stay as-is; an uncoercible
    /// join key fails the chunk, because a corrupted key would
    /// mis-partition the diff.
    fn coerce_chunk(
        &self,
        pipe: &Pipe,
        params: &mut PipeParameters,
        chunk: &mut Batch,
    ) -> EngineResult<()> {
        if params.static_schema {
            let rejected: Vec<String> = chunk
                .column_names()
                .iter()
                .filter(|c| !params.dtypes.contains_key(**c))
                .map(|c| c.to_string())
                .collect();
            if !rejected.is_empty() {
                warn!(
                    pipe = %pipe.keys,
                    columns = ?rejected,
                    "static pipe rejected new columns"
                );
                let kept: Vec<&str> = chunk
                    .column_names()
                    .into_iter()
                    .filter(|c| params.dtypes.contains_key(*c))
                    .collect();
                if kept.is_empty() {
                    return Err(EngineError::SchemaConflict {
                        column: rejected.join(", "),
                        message: "static pipe declares none of the batch's columns".into(),
                    });
                }
                *chunk = chunk
                    .select(&kept)
                    .map_err(|e| EngineError::configuration(e.to_string()))?;
            }
        }

        let report = enforce(chunk, &params.dtypes);
        if report.total_failed() > 0 {
            let failed_key = pipe
                .join_columns()
                .into_iter()
                .find(|c| report.columns.get(*c).is_some_and(|col| col.failed > 0));
            if let Some(column) = failed_key {
                return Err(EngineError::Coercion {
                    message: format!("join column {column} has uncoercible cells"),
                });
            }
            // Failed value cells stay as-is; recovered locally, not fatal.
            warn!(
                pipe = %pipe.keys,
                failed = report.total_failed(),
                "some cells could not be coerced"
            );
        }

        if !params.static_schema {
            let inferred = infer_dtypes(chunk);
            let changes = params.apply_dtypes(&inferred);
            if !changes.is_empty() {
                debug!(pipe = %pipe.keys, changes = changes.len(), "dtypes evolved");
                // Re-coerce so existing cells match any widened dtype.
                enforce(chunk, &params.dtypes);
            }
        }
        Ok(())
    }

    fn apply_one(
        &self,
        pipe: &Pipe,
        params: &PipeParameters,
        chunk: &Batch,
        window: &SyncWindow,
        options: &SyncOptions,
    ) -> EngineResult<SyncReceipt> {
        self.set_state(SyncState::Applying);
        let mut effective = pipe.clone();
        effective.parameters = params.clone();

        // Server-assigned keys: a batch without its primary column can
        // never match existing rows, so skip the diff outright.
        let autoincrement_insert = params.autoincrement
            && params
                .columns
                .primary
                .as_deref()
                .is_some_and(|primary| !chunk.has_column(primary));

        if !options.check_existing || autoincrement_insert {
            let inserted = self
                .instance
                .insert_pipe_rows(&effective, chunk, options.chunksize.max(1))
                .map_err(EngineError::from_apply)?;
            return Ok(SyncReceipt::new(inserted, 0));
        }

        self.instance
            .sync_pipe(&effective, chunk, window, options.chunksize.max(1))
            .map_err(EngineError::from_apply)
    }
}

/// Backs an axis value off by the backtrack window.
fn backtrack_cell(last: Cell, backtrack_minutes: i64) -> Cell {
    if backtrack_minutes <= 0 {
        return last;
    }
    match last {
        Cell::Datetime(dt) => Cell::Datetime(dt - chrono::Duration::minutes(backtrack_minutes)),
        Cell::DatetimeTz(dt) => {
            Cell::DatetimeTz(dt - chrono::Duration::minutes(backtrack_minutes))
        }
        Cell::Int(n) => Cell::Int(n - backtrack_minutes),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RetryConfig;
    use pipesync_connector::MemoryInstance;
    use pipesync_core::{ColumnRoles, PipeKeys};
    use pipesync_types::LogicalType;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn pipe() -> Pipe {
        let mut p = Pipe::new(PipeKeys::new("src", "metric"), "mem");
        p.parameters.columns = ColumnRoles {
            datetime: Some("dt".into()),
            id: Some("id".into()),
            value: Some("val".into()),
            ..Default::default()
        };
        p
    }

    fn dt(day: u32) -> Cell {
        Cell::Datetime(
            chrono::NaiveDate::from_ymd_opt(2022, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn rows(vals: &[(u32, i64, i64)]) -> Batch {
        Batch::from_rows(
            &["dt", "id", "val"],
            vals.iter()
                .map(|(d, i, v)| vec![dt(*d), Cell::Int(*i), Cell::Int(*v)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn sync_auto_registers_and_inserts() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let p = pipe();

        let outcome = engine.sync(
            &p,
            rows(&[(1, 1, 10), (2, 2, 20)]).into(),
            &SyncOptions::default(),
        );
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.state, SyncState::Succeeded);
        assert!(engine.instance().pipe_exists(&p.keys).unwrap());
    }

    #[test]
    fn resync_updates_instead_of_duplicating() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let p = pipe();

        engine.sync(&p, rows(&[(1, 1, 1)]).into(), &SyncOptions::default());
        let outcome = engine.sync(&p, rows(&[(1, 1, 2)]).into(), &SyncOptions::default());

        assert!(outcome.success);
        assert_eq!((outcome.inserted, outcome.updated), (0, 1));
        assert_eq!(engine.instance().row_count(&p.keys), 1);
    }

    #[test]
    fn empty_source_succeeds_with_no_rows() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let outcome = engine.sync(
            &pipe(),
            Batch::empty(&["dt", "id", "val"]).into(),
            &SyncOptions::default(),
        );
        assert!(outcome.success);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.message, "no rows to sync");
    }

    #[test]
    fn invalid_pipe_fails_without_panicking() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let bad = Pipe::new(PipeKeys::new("", "metric"), "mem");
        let outcome = engine.sync(&bad, rows(&[(1, 1, 1)]).into(), &SyncOptions::default());
        assert!(!outcome.success);
        assert_eq!(outcome.state, SyncState::Failed);
        assert!(outcome.message.contains("configuration"));
    }

    #[test]
    fn chunked_sync_equals_single_batch() {
        let data: Vec<(u32, i64, i64)> = (1..=9).map(|i| (i as u32 % 5 + 1, i, i * 10)).collect();

        let single = SyncEngine::new(MemoryInstance::new("a"));
        let p = pipe();
        single.sync(&p, rows(&data).into(), &SyncOptions::default());

        let chunked = SyncEngine::new(MemoryInstance::new("b"));
        chunked.sync(
            &p,
            rows(&data).into(),
            &SyncOptions::default().with_chunksize(2),
        );

        let a = single
            .instance()
            .get_pipe_data(&p, None, &SyncWindow::open())
            .unwrap();
        let b = chunked
            .instance()
            .get_pipe_data(&p, None, &SyncWindow::open())
            .unwrap();
        assert_eq!(a.num_rows(), b.num_rows());
    }

    #[test]
    fn check_existing_false_skips_the_diff() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let p = pipe();
        let batch = rows(&[(1, 1, 1)]);

        engine.sync(&p, batch.clone().into(), &SyncOptions::default());
        let outcome = engine.sync(
            &p,
            batch.into(),
            &SyncOptions::default().without_check_existing(),
        );
        assert!(outcome.success);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(engine.instance().row_count(&p.keys), 2);
    }

    #[test]
    fn static_pipe_drops_unknown_columns_but_syncs() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let mut p = pipe();
        p.parameters.static_schema = true;
        p.parameters
            .dtypes
            .insert("dt".into(), pipesync_types::LogicalType::Datetime);
        p.parameters
            .dtypes
            .insert("id".into(), pipesync_types::LogicalType::Int);
        p.parameters
            .dtypes
            .insert("val".into(), pipesync_types::LogicalType::Int);

        let batch = Batch::from_rows(
            &["dt", "id", "val", "rogue"],
            vec![vec![dt(1), Cell::Int(1), Cell::Int(1), Cell::Text("x".into())]],
        )
        .unwrap();
        let outcome = engine.sync(&p, batch.into(), &SyncOptions::default());
        assert!(outcome.success, "{}", outcome.message);

        let data = engine
            .instance()
            .get_pipe_data(&p, None, &SyncWindow::open())
            .unwrap();
        assert!(!data.has_column("rogue"));
        assert_eq!(data.num_rows(), 1);
    }

    #[test]
    fn fetch_source_uses_backtrack_window() {
        struct WindowProbe {
            seen: Mutex<Vec<SyncWindow>>,
        }
        impl SourceConnector for WindowProbe {
            fn fetch(
                &self,
                _pipe: &Pipe,
                window: &SyncWindow,
                _chunk_hook: Option<pipesync_connector::ChunkHook<'_>>,
            ) -> ConnectorResult<FetchPayload> {
                self.seen.lock().push(window.clone());
                Ok(FetchPayload::Batch(Batch::default()))
            }
        }

        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let mut p = pipe();
        p.parameters.fetch = Some(pipesync_core::FetchDefinition {
            backtrack_minutes: 60,
            ..Default::default()
        });

        // Seed one row so there is a last sync time.
        engine.sync(&p, rows(&[(2, 1, 1)]).into(), &SyncOptions::default());

        let probe = Arc::new(WindowProbe {
            seen: Mutex::new(Vec::new()),
        });
        engine.sync(
            &p,
            SyncSource::Fetch(probe.clone()),
            &SyncOptions::default(),
        );

        let seen = probe.seen.lock();
        let begin = seen[0].begin.clone().unwrap();
        // Last axis value was Jan 2 00:00; backtracked an hour.
        assert_eq!(
            begin,
            Cell::Datetime(
                chrono::NaiveDate::from_ymd_opt(2022, 1, 1)
                    .unwrap()
                    .and_hms_opt(23, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn hook_driven_fetch_is_accepted() {
        struct Pusher;
        impl SourceConnector for Pusher {
            fn fetch(
                &self,
                _pipe: &Pipe,
                _window: &SyncWindow,
                chunk_hook: Option<pipesync_connector::ChunkHook<'_>>,
            ) -> ConnectorResult<FetchPayload> {
                let hook = chunk_hook.expect("engine always passes a hook");
                hook(
                    Batch::from_rows(
                        &["dt", "id", "val"],
                        vec![vec![
                            Cell::Datetime(
                                chrono::NaiveDate::from_ymd_opt(2022, 1, 1)
                                    .unwrap()
                                    .and_hms_opt(0, 0, 0)
                                    .unwrap(),
                            ),
                            Cell::Int(1),
                            Cell::Int(10),
                        ]],
                    )
                    .unwrap(),
                )?;
                Ok(FetchPayload::Accepted(true))
            }
        }

        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let p = pipe();
        let outcome = engine.sync(&p, SyncSource::Fetch(Arc::new(Pusher)), &SyncOptions::default());
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn background_sync_reports_through_callback() {
        let engine = Arc::new(SyncEngine::new(MemoryInstance::new("mem")));
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = engine.sync_background(
            pipe(),
            rows(&[(1, 1, 1)]).into(),
            SyncOptions::default(),
            move |outcome| {
                tx.send(outcome).ok();
            },
        );
        handle.join().unwrap();

        let outcome = rx.recv().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn stream_chunks_apply_before_the_stream_is_drained() {
        struct Trickle {
            instance: Arc<MemoryInstance>,
            keys: PipeKeys,
            yielded: u32,
            rows_before_second: Arc<AtomicUsize>,
        }
        impl Iterator for Trickle {
            type Item = ConnectorResult<Batch>;
            fn next(&mut self) -> Option<Self::Item> {
                if self.yielded == 1 {
                    self.rows_before_second
                        .store(self.instance.row_count(&self.keys), Ordering::SeqCst);
                }
                if self.yielded == 2 {
                    return None;
                }
                self.yielded += 1;
                let i = i64::from(self.yielded);
                Some(Ok(rows(&[(self.yielded, i, i * 10)])))
            }
        }

        let instance = Arc::new(MemoryInstance::new("mem"));
        let engine = SyncEngine::from_arc(Arc::clone(&instance));
        let p = pipe();
        let rows_before_second = Arc::new(AtomicUsize::new(usize::MAX));
        let source = SyncSource::Chunks(Box::new(Trickle {
            instance: Arc::clone(&instance),
            keys: p.keys.clone(),
            yielded: 0,
            rows_before_second: Arc::clone(&rows_before_second),
        }));

        let outcome = engine.sync(&p, source, &SyncOptions::default());
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.inserted, 2);
        // The first chunk had already landed when the second was pulled.
        assert_eq!(rows_before_second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_apply_failure_retries_only_that_chunk() {
        struct Flaky {
            inner: MemoryInstance,
            failures_left: AtomicUsize,
        }
        impl InstanceConnector for Flaky {
            fn register_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
                self.inner.register_pipe(pipe)
            }
            fn edit_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
                self.inner.edit_pipe(pipe)
            }
            fn delete_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
                self.inner.delete_pipe(keys)
            }
            fn drop_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
                self.inner.drop_pipe(keys)
            }
            fn pipe_exists(&self, keys: &PipeKeys) -> ConnectorResult<bool> {
                self.inner.pipe_exists(keys)
            }
            fn get_pipe_attributes(&self, keys: &PipeKeys) -> ConnectorResult<PipeParameters> {
                self.inner.get_pipe_attributes(keys)
            }
            fn get_pipe_columns_types(
                &self,
                keys: &PipeKeys,
            ) -> ConnectorResult<BTreeMap<String, LogicalType>> {
                self.inner.get_pipe_columns_types(keys)
            }
            fn get_sync_time(&self, pipe: &Pipe) -> ConnectorResult<Option<Cell>> {
                self.inner.get_sync_time(pipe)
            }
            fn sync_pipe(
                &self,
                pipe: &Pipe,
                batch: &Batch,
                window: &SyncWindow,
                chunksize: usize,
            ) -> ConnectorResult<SyncReceipt> {
                if self.failures_left.load(Ordering::SeqCst) > 0 {
                    self.failures_left.fetch_sub(1, Ordering::SeqCst);
                    return Err(ConnectorError::backend("deadlock detected", true));
                }
                self.inner.sync_pipe(pipe, batch, window, chunksize)
            }
            fn insert_pipe_rows(
                &self,
                pipe: &Pipe,
                batch: &Batch,
                chunksize: usize,
            ) -> ConnectorResult<u64> {
                self.inner.insert_pipe_rows(pipe, batch, chunksize)
            }
            fn get_pipe_data(
                &self,
                pipe: &Pipe,
                select_cols: Option<&[&str]>,
                window: &SyncWindow,
            ) -> ConnectorResult<Batch> {
                self.inner.get_pipe_data(pipe, select_cols, window)
            }
        }

        let engine = SyncEngine::new(Flaky {
            inner: MemoryInstance::new("mem"),
            failures_left: AtomicUsize::new(1),
        });
        let outcome = engine.sync(
            &pipe(),
            rows(&[(1, 1, 1)]).into(),
            &SyncOptions::default()
                .with_retry(RetryConfig::new(3).with_delay(Duration::ZERO)),
        );
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(engine.stats().retries, 1);
    }

    #[test]
    fn uncoercible_join_keys_fail_the_sync() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let mut p = pipe();
        p.parameters.dtypes.insert("id".into(), LogicalType::Int);

        let batch = Batch::from_rows(
            &["dt", "id", "val"],
            vec![vec![dt(1), Cell::Text("not-a-number".into()), Cell::Int(1)]],
        )
        .unwrap();
        let outcome = engine.sync(&p, batch.into(), &SyncOptions::default());
        assert!(!outcome.success);
        assert!(
            outcome.message.contains("coercion error"),
            "{}",
            outcome.message
        );
    }

    #[test]
    fn static_pipe_sharing_no_columns_is_a_schema_conflict() {
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let mut p = pipe();
        p.parameters.static_schema = true;
        p.parameters.dtypes.insert("dt".into(), LogicalType::Datetime);

        let batch = Batch::from_rows(&["rogue"], vec![vec![Cell::Int(1)]]).unwrap();
        let outcome = engine.sync(&p, batch.into(), &SyncOptions::default());
        assert!(!outcome.success);
        assert!(
            outcome.message.contains("schema conflict"),
            "{}",
            outcome.message
        );
    }

    #[test]
    fn retry_config_bounds_attempts() {
        // A configuration failure is never retried even with budget.
        let engine = SyncEngine::new(MemoryInstance::new("mem"));
        let bad = Pipe::new(PipeKeys::new("", "m"), "mem");
        let outcome = engine.sync(
            &bad,
            rows(&[(1, 1, 1)]).into(),
            &SyncOptions::default().with_retry(RetryConfig::new(5)),
        );
        assert!(!outcome.success);
        assert_eq!(engine.stats().retries, 0);
    }
}
