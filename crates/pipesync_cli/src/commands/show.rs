//! Show command implementation.

use crate::store::Store;
use serde::Serialize;
use std::error::Error;
use std::path::Path;

/// One pipe's summary line.
#[derive(Debug, Serialize)]
pub struct PipeSummary {
    /// The identity keys as `connector:metric[:location]`.
    pub keys: String,
    /// The instance name.
    pub instance: String,
    /// The diff join columns.
    pub join_columns: Vec<String>,
    /// Declared dtypes, column to canonical type name.
    pub dtypes: Vec<(String, String)>,
    /// Stored row count.
    pub rows: usize,
}

/// Runs the show command.
pub fn run(store_path: &Path, format: &str) -> Result<(), Box<dyn Error>> {
    let store = Store::load(store_path)?;
    let summaries: Vec<PipeSummary> = store
        .pipes
        .iter()
        .map(|stored| PipeSummary {
            keys: stored.pipe.keys.to_string(),
            instance: stored.pipe.instance.clone(),
            join_columns: stored
                .pipe
                .join_columns()
                .into_iter()
                .map(String::from)
                .collect(),
            dtypes: stored
                .pipe
                .parameters
                .dtypes
                .iter()
                .map(|(name, dtype)| (name.clone(), dtype.to_string()))
                .collect(),
            rows: stored.rows.len(),
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => print_text_output(&summaries),
    }
    Ok(())
}

fn print_text_output(summaries: &[PipeSummary]) {
    if summaries.is_empty() {
        println!("No pipes registered");
        return;
    }
    for summary in summaries {
        println!("{}", summary.keys);
        println!("  instance: {}", summary.instance);
        println!("  join:     {}", summary.join_columns.join(", "));
        if !summary.dtypes.is_empty() {
            let rendered: Vec<String> = summary
                .dtypes
                .iter()
                .map(|(name, dtype)| format!("{name} {dtype}"))
                .collect();
            println!("  columns:  {}", rendered.join(", "));
        }
        println!("  rows:     {}", summary.rows);
    }
}
