//! Plan command implementation.

use crate::store::{batch_from_rows, Store};
use pipesync_connector::{InstanceConnector, RecordingClient, SqlInstance, SyncWindow};
use pipesync_core::PipeKeys;
use pipesync_types::Flavor;
use serde_json::{Map, Value};
use std::error::Error;
use std::fs;
use std::path::Path;

/// Runs the plan command: renders the SQL a sync of the given rows
/// would execute against the chosen backend, without touching one.
///
/// The target is assumed absent and empty, so the plan shows the full
/// first-sync shape: metadata bootstrap, target creation, and inserts.
pub fn run(
    store_path: &Path,
    pipe_keys: &str,
    rows_file: &Path,
    flavor_name: &str,
) -> Result<(), Box<dyn Error>> {
    let keys: PipeKeys = pipe_keys.parse()?;
    let flavor: Flavor = flavor_name.parse()?;

    let store = Store::load(store_path)?;
    let stored = store
        .find(&keys)
        .ok_or_else(|| format!("pipe {keys} is not registered"))?;
    let pipe = stored.pipe.clone();

    let text = fs::read_to_string(rows_file)?;
    let rows: Vec<Map<String, Value>> = serde_json::from_str(&text)?;
    let batch = batch_from_rows(&rows, &pipe.parameters.dtypes)?;

    let instance = SqlInstance::new(RecordingClient::new(flavor));
    instance.register_pipe(&pipe)?;
    instance.sync_pipe(&pipe, &batch, &SyncWindow::open(), 500)?;

    let statements = instance.client().statements();
    println!("-- {} on {flavor}: {} statement(s)", pipe.keys, statements.len());
    for statement in statements {
        if statement.ends_with(';') {
            println!("{statement}");
        } else {
            println!("{statement};");
        }
    }
    Ok(())
}
