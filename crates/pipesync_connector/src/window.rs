//! The half-open sync window.

use pipesync_batch::Cell;
use pipesync_sql::{literal, quote_ident};
use pipesync_types::Flavor;
use std::cmp::Ordering;

/// A half-open bound on the time axis: `begin` inclusive, `end`
/// exclusive.
///
/// Bounds are cells so a window works on datetime axes and on integer
/// axes alike. An unbounded side matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncWindow {
    /// Inclusive lower bound.
    pub begin: Option<Cell>,
    /// Exclusive upper bound.
    pub end: Option<Cell>,
}

impl SyncWindow {
    /// The unbounded window.
    pub fn open() -> Self {
        Self::default()
    }

    /// Sets the inclusive lower bound.
    pub fn with_begin(mut self, begin: Cell) -> Self {
        self.begin = Some(begin);
        self
    }

    /// Sets the exclusive upper bound.
    pub fn with_end(mut self, end: Cell) -> Self {
        self.end = Some(end);
        self
    }

    /// Whether no bound is set.
    pub fn is_open(&self) -> bool {
        self.begin.is_none() && self.end.is_none()
    }

    /// Whether an axis value falls inside the window.
    ///
    /// NULL axis values are always in range (rows without a time axis
    /// value are never silently excluded), as are values the bounds
    /// cannot be compared with.
    pub fn contains(&self, value: &Cell) -> bool {
        if value.is_null() {
            return true;
        }
        if let Some(begin) = &self.begin {
            if axis_cmp(value, begin) == Some(Ordering::Less) {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if axis_cmp(value, end) != Some(Ordering::Less) {
                return false;
            }
        }
        true
    }

    /// Renders the window as a SQL predicate on the axis column, or
    /// `None` when the window is open.
    pub fn predicate(&self, flavor: Flavor, axis_col: &str) -> Option<String> {
        let col = quote_ident(flavor, axis_col);
        let mut parts = Vec::new();
        if let Some(begin) = &self.begin {
            parts.push(format!("{col} >= {}", literal(flavor, begin)));
        }
        if let Some(end) = &self.end {
            parts.push(format!("{col} < {}", literal(flavor, end)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}

/// Orders two axis cells, crossing the int/float divide; `None` when
/// the cells are not comparable.
pub(crate) fn axis_cmp(a: &Cell, b: &Cell) -> Option<Ordering> {
    match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => Some(x.cmp(y)),
        (Cell::Float(x), Cell::Float(y)) => x.partial_cmp(y),
        (Cell::Int(x), Cell::Float(y)) => (*x as f64).partial_cmp(y),
        (Cell::Float(x), Cell::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Cell::Numeric(x), Cell::Numeric(y)) => Some(x.cmp(y)),
        (Cell::Datetime(x), Cell::Datetime(y)) => Some(x.cmp(y)),
        (Cell::DatetimeTz(x), Cell::DatetimeTz(y)) => Some(x.cmp(y)),
        (Cell::Datetime(x), Cell::DatetimeTz(y)) => Some(x.cmp(&y.naive_utc())),
        (Cell::DatetimeTz(x), Cell::Datetime(y)) => Some(x.naive_utc().cmp(y)),
        (Cell::Text(x), Cell::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32) -> Cell {
        Cell::Datetime(
            NaiveDate::from_ymd_opt(2022, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn begin_inclusive_end_exclusive() {
        let window = SyncWindow::open().with_begin(dt(2)).with_end(dt(4));
        assert!(!window.contains(&dt(1)));
        assert!(window.contains(&dt(2)));
        assert!(window.contains(&dt(3)));
        assert!(!window.contains(&dt(4)));
    }

    #[test]
    fn open_window_contains_everything() {
        let window = SyncWindow::open();
        assert!(window.is_open());
        assert!(window.contains(&dt(1)));
        assert!(window.contains(&Cell::Int(-5)));
    }

    #[test]
    fn null_axis_values_are_in_range() {
        let window = SyncWindow::open().with_begin(dt(2));
        assert!(window.contains(&Cell::Null));
    }

    #[test]
    fn integer_axis_windows() {
        let window = SyncWindow::open().with_begin(Cell::Int(10));
        assert!(!window.contains(&Cell::Int(9)));
        assert!(window.contains(&Cell::Int(10)));
        assert!(window.contains(&Cell::Float(10.5)));
    }

    #[test]
    fn predicate_renders_both_bounds() {
        let window = SyncWindow::open().with_begin(dt(2)).with_end(dt(4));
        let sql = window.predicate(Flavor::Postgres, "dt").unwrap();
        assert_eq!(
            sql,
            "\"dt\" >= '2022-01-02 00:00:00' AND \"dt\" < '2022-01-04 00:00:00'"
        );
        assert!(SyncWindow::open().predicate(Flavor::Postgres, "dt").is_none());
    }
}
