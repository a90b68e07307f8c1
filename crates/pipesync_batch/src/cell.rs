//! The dynamic value type held by batch cells.

use chrono::{DateTime, NaiveDateTime, Utc};
use pipesync_types::LogicalType;
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// A single value in a batch.
///
/// The variants mirror the canonical logical types. Geometry is carried
/// as WKT text, so it has no variant of its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Arbitrary-precision decimal.
    Numeric(Decimal),
    /// UTF-8 text.
    Text(String),
    /// Naive timestamp.
    Datetime(NaiveDateTime),
    /// Timezone-aware timestamp, normalized to UTC.
    DatetimeTz(DateTime<Utc>),
    /// Nested JSON document.
    Json(serde_json::Value),
    /// UUID.
    Uuid(Uuid),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Cell {
    /// Returns the logical type this cell naturally carries, or `None`
    /// for `Null` (NULL is typeless until a column dtype says otherwise).
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(LogicalType::Bool),
            Cell::Int(_) => Some(LogicalType::Int),
            Cell::Float(_) => Some(LogicalType::Float),
            Cell::Numeric(_) => Some(LogicalType::NUMERIC),
            Cell::Text(_) => Some(LogicalType::String),
            Cell::Datetime(_) => Some(LogicalType::Datetime),
            Cell::DatetimeTz(_) => Some(LogicalType::DatetimeTz),
            Cell::Json(_) => Some(LogicalType::Json),
            Cell::Uuid(_) => Some(LogicalType::Uuid),
            Cell::Bytes(_) => Some(LogicalType::Bytes),
        }
    }

    /// Returns true if this cell is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Gets this cell as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this cell as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Gets this cell as a JSON value, if it is one.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Cell::Json(v) => Some(v),
            _ => None,
        }
    }

    /// A canonical, order-stable string rendering used for join keys and
    /// equality comparison of nested values.
    ///
    /// `serde_json::Value` objects keep their keys in sorted order, so
    /// `to_string` on a JSON cell is already deterministic.
    pub fn canonical_string(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(x) => {
                // Integral floats render like ints so 1.0 joins with 1.
                if x.fract() == 0.0 && x.is_finite() && x.abs() < 9.007_199_254_740_992e15 {
                    format!("{}", *x as i64)
                } else {
                    x.to_string()
                }
            }
            Cell::Numeric(d) => d.normalize().to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Datetime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Cell::DatetimeTz(dt) => dt
                .naive_utc()
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string(),
            Cell::Json(v) => v.to_string(),
            Cell::Uuid(u) => u.to_string(),
            Cell::Bytes(b) => {
                let mut out = String::with_capacity(b.len() * 2);
                for byte in b {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            other => f.write_str(&other.canonical_string()),
        }
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

impl From<i32> for Cell {
    fn from(n: i32) -> Self {
        Cell::Int(i64::from(n))
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Cell::Float(x)
    }
}

impl From<Decimal> for Cell {
    fn from(d: Decimal) -> Self {
        Cell::Numeric(d)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(dt: NaiveDateTime) -> Self {
        Cell::Datetime(dt)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(dt: DateTime<Utc>) -> Self {
        Cell::DatetimeTz(dt)
    }
}

impl From<serde_json::Value> for Cell {
    fn from(v: serde_json::Value) -> Self {
        Cell::Json(v)
    }
}

impl From<Uuid> for Cell {
    fn from(u: Uuid) -> Self {
        Cell::Uuid(u)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(b: Vec<u8>) -> Self {
        Cell::Bytes(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Cell::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logical_types() {
        assert_eq!(Cell::Int(1).logical_type(), Some(LogicalType::Int));
        assert_eq!(Cell::Null.logical_type(), None);
        assert_eq!(
            Cell::Json(json!({"a": 1})).logical_type(),
            Some(LogicalType::Json)
        );
    }

    #[test]
    fn canonical_float_matches_int() {
        assert_eq!(Cell::Float(1.0).canonical_string(), Cell::Int(1).canonical_string());
        assert_ne!(Cell::Float(1.5).canonical_string(), Cell::Int(1).canonical_string());
    }

    #[test]
    fn canonical_json_is_order_stable() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(
            Cell::Json(a).canonical_string(),
            Cell::Json(b).canonical_string()
        );
    }

    #[test]
    fn canonical_numeric_normalizes_trailing_zeros() {
        let a = Cell::Numeric("1.50".parse().unwrap());
        let b = Cell::Numeric("1.5".parse().unwrap());
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn from_option() {
        assert_eq!(Cell::from(Some(5i64)), Cell::Int(5));
        assert_eq!(Cell::from(None::<i64>), Cell::Null);
    }
}
