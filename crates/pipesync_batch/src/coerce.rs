//! Forcing a batch into declared dtypes, and inferring dtypes for
//! undeclared columns.
//!
//! Coercion is tolerant by design: a cell that cannot be cast to its
//! declared type is left unmodified and counted in the report. Rows are
//! never dropped here.

use crate::batch::Batch;
use crate::cell::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pipesync_types::LogicalType;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-column outcome of one [`enforce`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCoercion {
    /// Cells successfully cast to the declared type.
    pub coerced: usize,
    /// Cells left unmodified after all fallbacks failed.
    pub failed: usize,
}

/// Outcome of one [`enforce`] pass over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionReport {
    /// Per-column counts, only for columns that needed any work.
    pub columns: BTreeMap<String, ColumnCoercion>,
}

impl CoercionReport {
    /// Total cells that resisted every cast attempt.
    pub fn total_failed(&self) -> usize {
        self.columns.values().map(|c| c.failed).sum()
    }

    /// Total cells that were rewritten.
    pub fn total_coerced(&self) -> usize {
        self.columns.values().map(|c| c.coerced).sum()
    }
}

/// Forces each declared column of `batch` into its declared dtype.
///
/// Columns named in `dtypes` but absent from the batch are ignored;
/// batch columns not named in `dtypes` are left untouched (they go
/// through [`infer_dtypes`] instead).
pub fn enforce(batch: &mut Batch, dtypes: &BTreeMap<String, LogicalType>) -> CoercionReport {
    let mut report = CoercionReport::default();

    for col in batch.columns_mut() {
        let Some(target) = dtypes.get(&col.name) else {
            continue;
        };
        col.dtype = Some(*target);

        let mut outcome = ColumnCoercion::default();
        for cell in &mut col.cells {
            if cell.is_null() {
                continue;
            }
            if cell
                .logical_type()
                .is_some_and(|lt| lt.is_equivalent(target))
            {
                continue;
            }
            match coerce_cell(cell, target) {
                Some(new_cell) => {
                    *cell = new_cell;
                    outcome.coerced += 1;
                }
                None => outcome.failed += 1,
            }
        }
        if outcome != ColumnCoercion::default() {
            debug!(
                column = %col.name,
                coerced = outcome.coerced,
                failed = outcome.failed,
                "coerced column"
            );
            report.columns.insert(col.name.clone(), outcome);
        }
    }

    report
}

/// Attempts to cast one cell to a target type. `None` means every
/// fallback failed and the cell stays as-is.
fn coerce_cell(cell: &Cell, target: &LogicalType) -> Option<Cell> {
    match target {
        LogicalType::Json => match cell {
            Cell::Text(s) => serde_json::from_str(s).ok().map(Cell::Json),
            _ => None,
        },
        LogicalType::Numeric { .. } => coerce_numeric(cell),
        LogicalType::Int => match cell {
            Cell::Bool(b) => Some(Cell::Int(i64::from(*b))),
            Cell::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(Cell::Int(*x as i64)),
            Cell::Numeric(d) => d.to_i64().map(Cell::Int),
            Cell::Text(s) => match s.trim().parse::<i64>() {
                Ok(n) => Some(Cell::Int(n)),
                // Float round-trip before giving up.
                Err(_) => s.trim().parse::<f64>().ok().map(Cell::Float),
            },
            _ => None,
        },
        LogicalType::Float => match cell {
            Cell::Int(n) => Some(Cell::Float(*n as f64)),
            Cell::Numeric(d) => d.to_f64().map(Cell::Float),
            Cell::Bool(b) => Some(Cell::Float(f64::from(*b))),
            Cell::Text(s) => s.trim().parse::<f64>().ok().map(Cell::Float),
            _ => None,
        },
        LogicalType::Bool => match cell {
            Cell::Int(0) => Some(Cell::Bool(false)),
            Cell::Int(1) => Some(Cell::Bool(true)),
            Cell::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(Cell::Bool(true)),
                "false" | "f" | "0" => Some(Cell::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        LogicalType::Datetime => match cell {
            Cell::Text(s) => parse_naive_datetime(s).map(Cell::Datetime),
            Cell::DatetimeTz(dt) => Some(Cell::Datetime(dt.naive_utc())),
            _ => None,
        },
        LogicalType::DatetimeTz => match cell {
            Cell::Text(s) => parse_datetime_tz(s).map(Cell::DatetimeTz),
            Cell::Datetime(dt) => Some(Cell::DatetimeTz(dt.and_utc())),
            _ => None,
        },
        LogicalType::Uuid => match cell {
            Cell::Text(s) => s.trim().parse().ok().map(Cell::Uuid),
            _ => None,
        },
        LogicalType::String | LogicalType::Geometry => Some(Cell::Text(cell.canonical_string())),
        LogicalType::Bytes => None,
    }
}

/// The decimal path: int and float representations meet at `Decimal`,
/// text tries `Decimal` first, then the float round-trip.
fn coerce_numeric(cell: &Cell) -> Option<Cell> {
    match cell {
        Cell::Int(n) => Some(Cell::Numeric(Decimal::from(*n))),
        Cell::Float(x) => Decimal::from_f64(*x).map(Cell::Numeric),
        Cell::Text(s) => {
            let trimmed = s.trim();
            if let Ok(d) = trimmed.parse::<Decimal>() {
                return Some(Cell::Numeric(d));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Decimal::from_f64)
                .map(Cell::Numeric)
        }
        _ => None,
    }
}

/// Parses an ISO-8601-ish naive timestamp.
pub(crate) fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if let Some(tz) = parse_datetime_tz(trimmed) {
        return Some(tz.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parses an offset-carrying ISO-8601 timestamp, normalized to UTC.
pub(crate) fn parse_datetime_tz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Infers dtypes for columns that do not declare one.
///
/// The result is meant to be persisted onto the pipe so later syncs are
/// declarative rather than re-inferred.
pub fn infer_dtypes(batch: &Batch) -> BTreeMap<String, LogicalType> {
    let mut inferred = BTreeMap::new();
    for col in batch.columns() {
        if col.dtype.is_some() {
            continue;
        }
        inferred.insert(col.name.clone(), infer_column(&col.cells));
    }
    inferred
}

fn infer_column(cells: &[Cell]) -> LogicalType {
    let mut seen_int = false;
    let mut seen_float = false;
    let mut seen_bool = false;
    let mut seen_json = false;
    let mut seen_numeric = false;
    let mut seen_uuid = false;
    let mut seen_bytes = false;
    let mut seen_datetime = false;
    let mut seen_datetime_tz = false;
    let mut text_all_datetime = true;
    let mut text_any_offset = false;
    let mut seen_text = false;

    for cell in cells {
        match cell {
            Cell::Null => {}
            Cell::Int(_) => seen_int = true,
            Cell::Float(_) => seen_float = true,
            Cell::Bool(_) => seen_bool = true,
            Cell::Json(_) => seen_json = true,
            Cell::Numeric(_) => seen_numeric = true,
            Cell::Uuid(_) => seen_uuid = true,
            Cell::Bytes(_) => seen_bytes = true,
            Cell::Datetime(_) => seen_datetime = true,
            Cell::DatetimeTz(_) => seen_datetime_tz = true,
            Cell::Text(s) => {
                seen_text = true;
                if parse_datetime_tz(s).is_some() {
                    text_any_offset = true;
                } else if parse_naive_datetime(s).is_none() {
                    text_all_datetime = false;
                }
            }
        }
    }

    // Text that is uniformly ISO-8601-like counts as temporal, so a
    // column mixing datetime cells and datetime strings still infers
    // as a datetime.
    let text_is_temporal = seen_text && text_all_datetime;
    let kinds = [
        seen_int || seen_float || seen_numeric,
        seen_bool,
        seen_json,
        seen_uuid,
        seen_bytes,
        seen_datetime || seen_datetime_tz || text_is_temporal,
        seen_text && !text_is_temporal,
    ]
    .iter()
    .filter(|&&k| k)
    .count();

    if kinds > 1 {
        return LogicalType::String;
    }
    if seen_json {
        return LogicalType::Json;
    }
    if seen_numeric {
        return LogicalType::NUMERIC;
    }
    if seen_float {
        return LogicalType::Float;
    }
    if seen_int {
        return LogicalType::Int;
    }
    if seen_bool {
        return LogicalType::Bool;
    }
    if seen_uuid {
        return LogicalType::Uuid;
    }
    if seen_bytes {
        return LogicalType::Bytes;
    }
    if seen_datetime_tz || (text_is_temporal && text_any_offset) {
        return LogicalType::DatetimeTz;
    }
    if seen_datetime || text_is_temporal {
        return LogicalType::Datetime;
    }
    LogicalType::String
}
