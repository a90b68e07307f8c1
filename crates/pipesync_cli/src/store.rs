//! The JSON pipe store backing the CLI.
//!
//! One file holds every registered pipe and its rows. Commands load the
//! store into a [`MemoryInstance`], run against it, and write the
//! resulting state back. Cells round-trip through JSON: scalars map
//! directly, everything else is carried as its canonical string and
//! restored by dtype coercion on load.

use pipesync_batch::{coerce, Batch, Cell};
use pipesync_connector::{InstanceConnector, MemoryInstance, SyncWindow};
use pipesync_core::{Pipe, PipeKeys};
use pipesync_types::LogicalType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

/// One pipe plus its persisted rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPipe {
    /// The registered pipe.
    pub pipe: Pipe,
    /// Row objects, column name to value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Map<String, Value>>,
}

/// The whole store file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Store {
    /// Every registered pipe.
    #[serde(default)]
    pub pipes: Vec<StoredPipe>,
}

impl Store {
    /// Reads a store file. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the store file.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }

    /// Finds a stored pipe by its identity keys.
    pub fn find(&self, keys: &PipeKeys) -> Option<&StoredPipe> {
        self.pipes.iter().find(|stored| stored.pipe.keys == *keys)
    }

    /// Loads every pipe and its rows into a fresh in-memory instance.
    pub fn open_instance(&self, name: &str) -> Result<MemoryInstance, Box<dyn Error>> {
        let instance = MemoryInstance::new(name);
        for stored in &self.pipes {
            instance.register_pipe(&stored.pipe)?;
            if !stored.rows.is_empty() {
                let batch = batch_from_rows(&stored.rows, &stored.pipe.parameters.dtypes)?;
                instance.insert_pipe_rows(&stored.pipe, &batch, 0)?;
            }
        }
        Ok(instance)
    }

    /// Captures the instance state back into the store: evolved
    /// parameters and the current rows of every pipe.
    pub fn snapshot(&mut self, instance: &MemoryInstance) -> Result<(), Box<dyn Error>> {
        for stored in &mut self.pipes {
            stored.pipe.parameters = instance.get_pipe_attributes(&stored.pipe.keys)?;
            let data = instance.get_pipe_data(&stored.pipe, None, &SyncWindow::open())?;
            stored.rows = rows_from_batch(&data);
        }
        Ok(())
    }
}

/// Builds a batch from row objects, then coerces declared columns.
///
/// Column order is first-seen across the rows; keys absent from a row
/// read as NULL.
pub fn batch_from_rows(
    rows: &[Map<String, Value>],
    dtypes: &BTreeMap<String, LogicalType>,
) -> Result<Batch, Box<dyn Error>> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let cell_rows: Vec<Vec<Cell>> = rows
        .iter()
        .map(|row| {
            names
                .iter()
                .map(|name| row.get(name).map_or(Cell::Null, json_to_cell))
                .collect()
        })
        .collect();
    let mut batch = Batch::from_rows(&name_refs, cell_rows)?;
    coerce::enforce(&mut batch, dtypes);
    Ok(batch)
}

/// Renders a batch as row objects.
pub fn rows_from_batch(batch: &Batch) -> Vec<Map<String, Value>> {
    let names: Vec<String> = batch
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    (0..batch.num_rows())
        .map(|row| {
            let mut object = Map::new();
            for name in &names {
                let cell = batch.cell(row, name).unwrap_or(&Cell::Null);
                object.insert(name.clone(), cell_to_json(cell));
            }
            object
        })
        .collect()
}

fn json_to_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Cell::Text(s.clone()),
        nested => Cell::Json(nested.clone()),
    }
}

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Int(n) => Value::Number((*n).into()),
        Cell::Float(x) => Number::from_f64(*x)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(x.to_string())),
        Cell::Json(v) => v.clone(),
        other => Value::String(other.canonical_string()),
    }
}
