//! The reconciliation engine: separating incoming rows into unseen and
//! update sets relative to existing data.
//!
//! The join is NULL-safe: a NULL join key is substituted with the
//! per-type sentinel on both sides, so two NULLs compare equal. That is
//! the opposite of SQL ternary semantics, and exactly what repeated
//! syncs of the same row need. Policies with `match_nulls` disabled keep
//! the SQL semantics instead: a NULL key never matches, so NULL-keyed
//! incoming rows are always unseen.

use crate::batch::Batch;
use crate::cell::Cell;
use pipesync_types::{LogicalType, SentinelPolicy};
use std::collections::HashMap;
use tracing::debug;

/// The disjoint partition produced by [`reconcile`].
#[derive(Debug, Clone)]
pub struct DiffResult {
    /// Rows absent from the existing data.
    pub unseen: Batch,
    /// Rows present in the existing data with at least one changed
    /// non-key value.
    pub update: Batch,
    /// `unseen ∪ update`, in incoming row order. Used when no key exists
    /// to separate the two.
    pub delta: Batch,
}

impl DiffResult {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }
}

/// Partitions `incoming` against `existing` on `join_cols`.
///
/// Rows with no match are unseen; matched rows with any differing shared
/// non-key value are updates. Duplicate join keys within `incoming` are
/// all retained — deduplication is the caller's concern. An empty
/// `existing` short-circuits: everything is unseen.
pub fn reconcile(
    existing: &Batch,
    incoming: &Batch,
    join_cols: &[&str],
    policy: &SentinelPolicy,
) -> DiffResult {
    if existing.is_empty() {
        return DiffResult {
            unseen: incoming.clone(),
            update: incoming.take_rows(&[]),
            delta: incoming.clone(),
        };
    }

    // Only join on columns present in both batches.
    let join_cols: Vec<&str> = join_cols
        .iter()
        .copied()
        .filter(|c| existing.has_column(c) && incoming.has_column(c))
        .collect();

    // Shared non-key columns drive the changed-value comparison.
    let compare_cols: Vec<&str> = incoming
        .column_names()
        .into_iter()
        .filter(|name| !join_cols.contains(name) && existing.has_column(name))
        .collect();

    let mut existing_index: HashMap<String, usize> = HashMap::new();
    for row in 0..existing.num_rows() {
        // First occurrence wins; duplicate existing keys compare against
        // the earliest row.
        if let Some(key) = join_key(existing, row, &join_cols, policy) {
            existing_index.entry(key).or_insert(row);
        }
    }

    let mut unseen_rows = Vec::new();
    let mut update_rows = Vec::new();
    for row in 0..incoming.num_rows() {
        match join_key(incoming, row, &join_cols, policy)
            .as_ref()
            .and_then(|key| existing_index.get(key))
        {
            None => unseen_rows.push(row),
            Some(&existing_row) => {
                let changed = compare_cols.iter().any(|col| {
                    let left = incoming.cell(row, col).unwrap_or(&Cell::Null);
                    let right = existing.cell(existing_row, col).unwrap_or(&Cell::Null);
                    !cells_equal(left, right)
                });
                if changed {
                    update_rows.push(row);
                }
            }
        }
    }

    // Delta preserves incoming order: merge the two ascending index lists.
    let mut delta_rows = Vec::with_capacity(unseen_rows.len() + update_rows.len());
    delta_rows.extend_from_slice(&unseen_rows);
    delta_rows.extend_from_slice(&update_rows);
    delta_rows.sort_unstable();

    debug!(
        unseen = unseen_rows.len(),
        update = update_rows.len(),
        "reconciled batch"
    );

    DiffResult {
        unseen: incoming.take_rows(&unseen_rows),
        update: incoming.take_rows(&update_rows),
        delta: incoming.take_rows(&delta_rows),
    }
}

/// Builds the composite join key for one row, substituting sentinels
/// for NULL. Returns `None` when a NULL key is present and the policy
/// forbids NULL matching: such a row can never match anything.
fn join_key(
    batch: &Batch,
    row: usize,
    join_cols: &[&str],
    policy: &SentinelPolicy,
) -> Option<String> {
    let mut key = String::new();
    for col_name in join_cols {
        let col = batch.column(col_name).expect("join column checked above");
        let cell = &col.cells[row];
        let token = if cell.is_null() {
            if !policy.match_nulls {
                return None;
            }
            let dtype = col
                .dtype
                .or_else(|| first_non_null_type(&col.cells))
                .unwrap_or(LogicalType::String);
            policy.key_token(&dtype)
        } else {
            cell.canonical_string()
        };
        key.push_str(&token);
        key.push('\u{1f}');
    }
    Some(key)
}

fn first_non_null_type(cells: &[Cell]) -> Option<LogicalType> {
    cells.iter().find_map(Cell::logical_type)
}

/// Value equality for the changed-row check: two NULLs are equal, and
/// everything else compares through the canonical string form so JSON
/// key order and numeric width differences do not register as changes.
fn cells_equal(a: &Cell, b: &Cell) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => a.canonical_string() == b.canonical_string(),
    }
}
