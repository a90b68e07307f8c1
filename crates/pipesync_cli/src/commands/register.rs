//! Register command implementation.

use crate::store::{Store, StoredPipe};
use pipesync_core::Pipe;
use std::error::Error;
use std::fs;
use std::path::Path;

/// Runs the register command: adds pipes from a JSON definition file to
/// the store. Already-registered pipes are skipped with a note.
pub fn run(store_path: &Path, file: &Path) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(file)?;
    let pipes: Vec<Pipe> = serde_json::from_str(&text)?;

    let mut store = Store::load(store_path)?;
    let mut added = 0usize;
    for pipe in pipes {
        pipe.validate()?;
        if store.find(&pipe.keys).is_some() {
            println!("skipped {} (already registered)", pipe.keys);
            continue;
        }
        println!("registered {}", pipe.keys);
        store.pipes.push(StoredPipe {
            pipe,
            rows: Vec::new(),
        });
        added += 1;
    }
    store.save(store_path)?;
    println!("{added} pipe(s) added");
    Ok(())
}
