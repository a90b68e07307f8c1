//! Sync command implementation.

use crate::store::{batch_from_rows, Store};
use pipesync_core::PipeKeys;
use pipesync_engine::{SyncEngine, SyncOptions};
use serde_json::{Map, Value};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Runs the sync command: pushes rows from a JSON file into one pipe
/// and persists the resulting state.
pub fn run(
    store_path: &Path,
    pipe_keys: &str,
    rows_file: &Path,
    chunksize: usize,
    workers: usize,
    insert_only: bool,
) -> Result<(), Box<dyn Error>> {
    let keys: PipeKeys = pipe_keys.parse()?;
    let mut store = Store::load(store_path)?;
    let stored = store
        .find(&keys)
        .ok_or_else(|| format!("pipe {keys} is not registered"))?;
    let pipe = stored.pipe.clone();

    let text = fs::read_to_string(rows_file)?;
    let rows: Vec<Map<String, Value>> = serde_json::from_str(&text)?;
    let batch = batch_from_rows(&rows, &pipe.parameters.dtypes)?;

    let instance = Arc::new(store.open_instance(&pipe.instance)?);
    let engine = SyncEngine::from_arc(Arc::clone(&instance));
    let mut options = SyncOptions::default()
        .with_chunksize(chunksize)
        .with_workers(workers);
    if insert_only {
        options = options.without_check_existing();
    }

    let outcome = engine.sync(&pipe, batch.into(), &options);
    println!("{}", outcome.message);
    println!(
        "  inserted: {}, updated: {}, took {:?}",
        outcome.inserted, outcome.updated, outcome.duration
    );
    if !outcome.success {
        return Err(outcome.message.into());
    }

    store.snapshot(&instance)?;
    store.save(store_path)?;
    Ok(())
}
