//! Ordered, named, typed columnar batches.

use crate::cell::Cell;
use crate::error::{BatchError, BatchResult};
use pipesync_types::LogicalType;
use std::collections::BTreeMap;

/// One named column of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Physical column name.
    pub name: String,
    /// Declared logical type, if known. Undeclared columns are inferred
    /// on first sync and persisted back onto the pipe.
    pub dtype: Option<LogicalType>,
    /// Cell values, one per row.
    pub cells: Vec<Cell>,
}

impl Column {
    /// Creates a column with no declared dtype.
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            dtype: None,
            cells,
        }
    }

    /// Creates a column with a declared dtype.
    pub fn typed(name: impl Into<String>, dtype: LogicalType, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            dtype: Some(dtype),
            cells,
        }
    }
}

/// An in-memory, typed, columnar set of rows.
///
/// Rows are ordered only by construction order; nothing sorts a batch
/// implicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    columns: Vec<Column>,
}

impl Batch {
    /// Creates a batch from columns, validating equal lengths.
    pub fn new(columns: Vec<Column>) -> BatchResult<Self> {
        if let Some(first) = columns.first() {
            let expected = first.cells.len();
            for col in &columns {
                if col.cells.len() != expected {
                    return Err(BatchError::RaggedColumns {
                        name: col.name.clone(),
                        actual: col.cells.len(),
                        expected,
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Creates an empty batch with the given column names.
    pub fn empty(names: &[&str]) -> Self {
        Self {
            columns: names
                .iter()
                .map(|name| Column::new(*name, Vec::new()))
                .collect(),
        }
    }

    /// Creates a batch from row tuples.
    pub fn from_rows(names: &[&str], rows: Vec<Vec<Cell>>) -> BatchResult<Self> {
        let mut batch = Self::empty(names);
        for row in rows {
            batch.push_row(row)?;
        }
        Ok(batch)
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// The columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Mutable access to the columns.
    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column mutably by name.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Returns true if the batch has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The declared dtypes of all columns that have one.
    pub fn dtypes(&self) -> BTreeMap<String, LogicalType> {
        self.columns
            .iter()
            .filter_map(|c| c.dtype.map(|d| (c.name.clone(), d)))
            .collect()
    }

    /// Declares a column's dtype.
    pub fn set_dtype(&mut self, name: &str, dtype: LogicalType) -> BatchResult<()> {
        match self.column_mut(name) {
            Some(col) => {
                col.dtype = Some(dtype);
                Ok(())
            }
            None => Err(BatchError::column_not_found(name)),
        }
    }

    /// Adds a new all-NULL column. No-op if the column already exists.
    pub fn add_column(&mut self, name: &str, dtype: Option<LogicalType>) {
        if self.has_column(name) {
            return;
        }
        let len = self.num_rows();
        self.columns.push(Column {
            name: name.to_string(),
            dtype,
            cells: vec![Cell::Null; len],
        });
    }

    /// Appends one row. Values map to columns by position.
    pub fn push_row(&mut self, row: Vec<Cell>) -> BatchResult<()> {
        if row.len() != self.columns.len() {
            return Err(BatchError::RowWidthMismatch {
                actual: row.len(),
                expected: self.columns.len(),
            });
        }
        for (col, cell) in self.columns.iter_mut().zip(row) {
            col.cells.push(cell);
        }
        Ok(())
    }

    /// One row's cells, in column order.
    pub fn row(&self, index: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.cells[index]).collect()
    }

    /// One row's cells cloned, in column order.
    pub fn row_cloned(&self, index: usize) -> Vec<Cell> {
        self.columns.iter().map(|c| c.cells[index].clone()).collect()
    }

    /// The cell at (row, column name), if both exist.
    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.column(name).and_then(|c| c.cells.get(row))
    }

    /// Projects onto a subset of columns, preserving the given order.
    pub fn select(&self, names: &[&str]) -> BatchResult<Batch> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let col = self
                .column(name)
                .ok_or_else(|| BatchError::column_not_found(*name))?;
            columns.push(col.clone());
        }
        Ok(Batch { columns })
    }

    /// Builds a new batch from a subset of row indices, preserving the
    /// given order. Out-of-range indices are skipped.
    pub fn take_rows(&self, indices: &[usize]) -> Batch {
        let columns = self
            .columns
            .iter()
            .map(|col| Column {
                name: col.name.clone(),
                dtype: col.dtype,
                cells: indices
                    .iter()
                    .filter_map(|&i| col.cells.get(i).cloned())
                    .collect(),
            })
            .collect();
        Batch { columns }
    }

    /// Appends another batch's rows. Columns are matched by name; a
    /// column present on only one side is an error.
    pub fn append(&mut self, other: &Batch) -> BatchResult<()> {
        if self.columns.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        for col in &other.columns {
            if !self.has_column(&col.name) {
                return Err(BatchError::schema_mismatch(format!(
                    "column {} missing from left batch",
                    col.name
                )));
            }
        }
        for col in &mut self.columns {
            match other.column(&col.name) {
                Some(source) => col.cells.extend(source.cells.iter().cloned()),
                None => {
                    return Err(BatchError::schema_mismatch(format!(
                        "column {} missing from right batch",
                        col.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Splits the batch into chunks of at most `chunksize` rows.
    pub fn chunks(&self, chunksize: usize) -> Vec<Batch> {
        if chunksize == 0 || self.num_rows() <= chunksize {
            return vec![self.clone()];
        }
        let mut out = Vec::new();
        let mut start = 0;
        while start < self.num_rows() {
            let end = (start + chunksize).min(self.num_rows());
            let indices: Vec<usize> = (start..end).collect();
            out.push(self.take_rows(&indices));
            start = end;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Batch {
        Batch::from_rows(
            &["id", "val"],
            vec![
                vec![Cell::Int(1), Cell::Text("a".into())],
                vec![Cell::Int(2), Cell::Text("b".into())],
                vec![Cell::Int(3), Cell::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn construction_and_shape() {
        let batch = sample();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.column_names(), vec!["id", "val"]);
    }

    #[test]
    fn ragged_columns_rejected() {
        let result = Batch::new(vec![
            Column::new("a", vec![Cell::Int(1)]),
            Column::new("b", vec![Cell::Int(1), Cell::Int(2)]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn row_width_mismatch_rejected() {
        let mut batch = sample();
        assert!(batch.push_row(vec![Cell::Int(4)]).is_err());
    }

    #[test]
    fn select_and_take_rows() {
        let batch = sample();
        let ids = batch.select(&["id"]).unwrap();
        assert_eq!(ids.num_columns(), 1);
        assert_eq!(ids.num_rows(), 3);

        let picked = batch.take_rows(&[2, 0]);
        assert_eq!(picked.num_rows(), 2);
        assert_eq!(picked.cell(0, "id"), Some(&Cell::Int(3)));
        assert_eq!(picked.cell(1, "id"), Some(&Cell::Int(1)));
    }

    #[test]
    fn append_matches_by_name() {
        let mut left = sample();
        // Right batch has the same columns in a different order.
        let right = Batch::from_rows(
            &["val", "id"],
            vec![vec![Cell::Text("z".into()), Cell::Int(9)]],
        )
        .unwrap();
        left.append(&right).unwrap();
        assert_eq!(left.num_rows(), 4);
        assert_eq!(left.cell(3, "id"), Some(&Cell::Int(9)));
        assert_eq!(left.cell(3, "val"), Some(&Cell::Text("z".into())));
    }

    #[test]
    fn append_rejects_schema_mismatch() {
        let mut left = sample();
        let right = Batch::from_rows(&["other"], vec![vec![Cell::Int(1)]]).unwrap();
        assert!(left.append(&right).is_err());
    }

    #[test]
    fn add_column_backfills_null() {
        let mut batch = sample();
        batch.add_column("extra", Some(LogicalType::Float));
        assert_eq!(batch.cell(0, "extra"), Some(&Cell::Null));
        assert_eq!(batch.cell(2, "extra"), Some(&Cell::Null));
    }

    #[test]
    fn chunking_covers_all_rows() {
        let batch = sample();
        let chunks = batch.chunks(2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].num_rows(), 2);
        assert_eq!(chunks[1].num_rows(), 1);
        assert_eq!(
            chunks.iter().map(Batch::num_rows).sum::<usize>(),
            batch.num_rows()
        );
    }
}
