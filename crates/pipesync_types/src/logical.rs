//! Canonical logical types and the native-type mapping.

use crate::flavor::Flavor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// A canonical logical column type.
///
/// Every backend's native type system maps onto this small closed set.
/// The string form (`"int"`, `"numeric(20,5)"`, ...) is what gets
/// persisted in a pipe's parameter document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// 64-bit signed integer.
    Int,
    /// Double-precision float.
    Float,
    /// Boolean.
    Bool,
    /// Unbounded text.
    String,
    /// Naive (zone-less) timestamp.
    Datetime,
    /// Timezone-aware timestamp.
    DatetimeTz,
    /// Nested JSON document.
    Json,
    /// Arbitrary-precision decimal. When precision is absent the
    /// backend's maximum is substituted at render time.
    Numeric {
        /// Total significant digits, if declared.
        precision: Option<u8>,
        /// Digits after the decimal point, if declared.
        scale: Option<u8>,
    },
    /// UUID.
    Uuid,
    /// Raw bytes.
    Bytes,
    /// Geometry, carried as WKT text on backends without spatial types.
    Geometry,
}

impl LogicalType {
    /// A `numeric` with no declared precision.
    pub const NUMERIC: LogicalType = LogicalType::Numeric {
        precision: None,
        scale: None,
    };

    /// Creates a `numeric(precision, scale)`.
    pub fn numeric(precision: u8, scale: u8) -> Self {
        LogicalType::Numeric {
            precision: Some(precision),
            scale: Some(scale),
        }
    }

    /// Renders the native column type for a backend.
    pub fn to_native(&self, flavor: Flavor) -> String {
        match self {
            LogicalType::Int => match flavor {
                Flavor::Oracle => "NUMBER(19)".into(),
                Flavor::Sqlite => "INTEGER".into(),
                _ => "BIGINT".into(),
            },
            LogicalType::Float => match flavor {
                f if f.is_postgres_family() => "DOUBLE PRECISION".into(),
                Flavor::Mysql | Flavor::Mariadb | Flavor::Duckdb => "DOUBLE".into(),
                Flavor::Mssql => "FLOAT".into(),
                Flavor::Oracle => "BINARY_DOUBLE".into(),
                Flavor::Sqlite => "REAL".into(),
                _ => "DOUBLE PRECISION".into(),
            },
            LogicalType::Bool => match flavor {
                Flavor::Mysql | Flavor::Mariadb => "TINYINT(1)".into(),
                Flavor::Mssql => "BIT".into(),
                Flavor::Oracle => "NUMBER(1)".into(),
                Flavor::Sqlite => "INTEGER".into(),
                _ => "BOOLEAN".into(),
            },
            LogicalType::String => match flavor {
                Flavor::Mssql => "NVARCHAR(MAX)".into(),
                Flavor::Oracle => "NVARCHAR2(2000)".into(),
                Flavor::Duckdb => "VARCHAR".into(),
                _ => "TEXT".into(),
            },
            LogicalType::Datetime => match flavor {
                Flavor::Mysql | Flavor::Mariadb | Flavor::Sqlite => "DATETIME".into(),
                Flavor::Mssql => "DATETIME2".into(),
                _ => "TIMESTAMP".into(),
            },
            LogicalType::DatetimeTz => match flavor {
                f if f.is_postgres_family() => "TIMESTAMPTZ".into(),
                Flavor::Mssql => "DATETIMEOFFSET".into(),
                Flavor::Oracle => "TIMESTAMP WITH TIME ZONE".into(),
                Flavor::Duckdb => "TIMESTAMPTZ".into(),
                // MySQL and SQLite have no zone-aware type; values are
                // normalized to UTC before insert.
                _ => "DATETIME".into(),
            },
            LogicalType::Json => match flavor {
                f if f.is_postgres_family() => "JSONB".into(),
                Flavor::Mysql | Flavor::Mariadb | Flavor::Duckdb => "JSON".into(),
                Flavor::Mssql => "NVARCHAR(MAX)".into(),
                Flavor::Oracle => "CLOB".into(),
                _ => "TEXT".into(),
            },
            LogicalType::Numeric { precision, scale } => {
                // SQLite has no true decimal type; TEXT preserves the
                // exact digits across round trips.
                if flavor == Flavor::Sqlite {
                    return "TEXT".into();
                }
                let (max_p, max_s) = flavor.max_numeric_precision();
                let p = precision.unwrap_or(max_p);
                let s = scale.unwrap_or(max_s);
                let keyword = match flavor {
                    Flavor::Mysql | Flavor::Mariadb | Flavor::Duckdb => "DECIMAL",
                    Flavor::Oracle => "NUMBER",
                    _ => "NUMERIC",
                };
                format!("{keyword}({p},{s})")
            }
            LogicalType::Uuid => match flavor {
                f if f.has_native_uuid() => "UUID".into(),
                Flavor::Mssql => "UNIQUEIDENTIFIER".into(),
                Flavor::Mysql | Flavor::Mariadb | Flavor::Oracle => "CHAR(36)".into(),
                _ => "TEXT".into(),
            },
            LogicalType::Bytes => match flavor {
                f if f.is_postgres_family() => "BYTEA".into(),
                Flavor::Mssql => "VARBINARY(MAX)".into(),
                _ => "BLOB".into(),
            },
            LogicalType::Geometry => match flavor {
                Flavor::Postgres | Flavor::Timescale | Flavor::Citus => "GEOMETRY".into(),
                _ => "TEXT".into(),
            },
        }
    }

    /// Parses a native type string back to a logical type.
    ///
    /// Unknown types fall back to `String` with a warning so an exotic
    /// column in an existing table never aborts a sync.
    pub fn from_native(native: &str) -> LogicalType {
        let trimmed = native.trim();
        let upper = trimmed.to_ascii_uppercase();
        let (base, args) = match upper.find('(') {
            Some(idx) => {
                let close = upper.rfind(')').unwrap_or(upper.len());
                (upper[..idx].trim().to_string(), Some(&upper[idx + 1..close]))
            }
            None => (upper.clone(), None),
        };

        match base.as_str() {
            "BIGINT" | "INT" | "INTEGER" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2"
            | "INT4" | "INT8" | "SERIAL" | "BIGSERIAL" => LogicalType::Int,
            "DOUBLE PRECISION" | "DOUBLE" | "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL"
            | "BINARY_DOUBLE" | "BINARY_FLOAT" => LogicalType::Float,
            "BOOLEAN" | "BOOL" | "BIT" => LogicalType::Bool,
            "TEXT" | "VARCHAR" | "NVARCHAR" | "NVARCHAR2" | "VARCHAR2" | "CHARACTER VARYING"
            | "CHAR" | "NCHAR" | "CLOB" | "NCLOB" | "LONGTEXT" | "MEDIUMTEXT" | "TINYTEXT"
            | "STRING" => LogicalType::String,
            "TIMESTAMP" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "DATE"
            | "TIMESTAMP WITHOUT TIME ZONE" => LogicalType::Datetime,
            "TIMESTAMPTZ" | "DATETIMEOFFSET" | "TIMESTAMP WITH TIME ZONE" => {
                LogicalType::DatetimeTz
            }
            "JSON" | "JSONB" => LogicalType::Json,
            "NUMERIC" | "DECIMAL" | "NUMBER" | "DEC" => {
                let mut precision = None;
                let mut scale = None;
                if let Some(args) = args {
                    let mut parts = args.split(',').map(str::trim);
                    precision = parts.next().and_then(|p| p.parse().ok());
                    scale = parts.next().and_then(|s| s.parse().ok());
                }
                // NUMBER(19) with no scale is Oracle's integer rendering.
                if base == "NUMBER" && precision == Some(19) && scale.is_none() {
                    return LogicalType::Int;
                }
                if base == "NUMBER" && precision == Some(1) && scale.is_none() {
                    return LogicalType::Bool;
                }
                LogicalType::Numeric { precision, scale }
            }
            "UUID" | "UNIQUEIDENTIFIER" => LogicalType::Uuid,
            "BYTEA" | "BLOB" | "VARBINARY" | "BINARY" | "LONGBLOB" | "MEDIUMBLOB"
            | "TINYBLOB" | "RAW" => LogicalType::Bytes,
            "GEOMETRY" | "GEOGRAPHY" => LogicalType::Geometry,
            other => {
                warn!(native = other, "unrecognized native type, treating as string");
                LogicalType::String
            }
        }
    }

    /// Width-insensitive family equivalence.
    ///
    /// Two types are equivalent when storing one in a column declared as
    /// the other loses nothing a pipe cares about, so no ALTER is needed.
    pub fn is_equivalent(&self, other: &LogicalType) -> bool {
        self.family() == other.family()
    }

    /// Returns the widened type needed to hold both `self` and
    /// `incoming`, or `None` when the current type already suffices.
    ///
    /// The lattice only moves up; narrowing is never produced.
    pub fn widens_to(&self, incoming: &LogicalType) -> Option<LogicalType> {
        if self.is_equivalent(incoming) {
            return None;
        }
        let widened = match (self, incoming) {
            (LogicalType::Bool, LogicalType::Int) | (LogicalType::Int, LogicalType::Bool) => {
                LogicalType::Int
            }
            (LogicalType::Int, LogicalType::Float) | (LogicalType::Float, LogicalType::Int) => {
                LogicalType::Float
            }
            (LogicalType::Int, LogicalType::Numeric { .. })
            | (LogicalType::Float, LogicalType::Numeric { .. }) => *incoming,
            (LogicalType::Numeric { .. }, LogicalType::Int)
            | (LogicalType::Numeric { .. }, LogicalType::Float) => *self,
            (LogicalType::Datetime, LogicalType::DatetimeTz)
            | (LogicalType::DatetimeTz, LogicalType::Datetime) => LogicalType::DatetimeTz,
            // Anything else can only meet at text.
            _ => LogicalType::String,
        };
        Some(widened)
    }

    /// The equivalence family used by [`Self::is_equivalent`].
    fn family(&self) -> u8 {
        match self {
            LogicalType::Int => 0,
            LogicalType::Float => 1,
            LogicalType::Bool => 2,
            LogicalType::String | LogicalType::Geometry => 3,
            LogicalType::Datetime => 4,
            LogicalType::DatetimeTz => 5,
            LogicalType::Json => 6,
            LogicalType::Numeric { .. } => 7,
            LogicalType::Uuid => 8,
            LogicalType::Bytes => 9,
        }
    }

    /// Returns true for the temporal types.
    pub fn is_temporal(&self) -> bool {
        matches!(self, LogicalType::Datetime | LogicalType::DatetimeTz)
    }

    /// Returns true for int, float, and numeric.
    pub fn is_numeric_like(&self) -> bool {
        matches!(
            self,
            LogicalType::Int | LogicalType::Float | LogicalType::Numeric { .. }
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Int => f.write_str("int"),
            LogicalType::Float => f.write_str("float"),
            LogicalType::Bool => f.write_str("bool"),
            LogicalType::String => f.write_str("string"),
            LogicalType::Datetime => f.write_str("datetime"),
            LogicalType::DatetimeTz => f.write_str("datetime-tz"),
            LogicalType::Json => f.write_str("json"),
            LogicalType::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "numeric({p},{s})"),
            LogicalType::Numeric {
                precision: Some(p),
                scale: None,
            } => write!(f, "numeric({p})"),
            LogicalType::Numeric { .. } => f.write_str("numeric"),
            LogicalType::Uuid => f.write_str("uuid"),
            LogicalType::Bytes => f.write_str("bytes"),
            LogicalType::Geometry => f.write_str("geometry"),
        }
    }
}

impl FromStr for LogicalType {
    type Err = std::convert::Infallible;

    /// Canonical names parse exactly; anything else goes through the
    /// native-type fallback, so parsing never fails.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let parsed = match lower.as_str() {
            "int" => LogicalType::Int,
            "float" => LogicalType::Float,
            "bool" => LogicalType::Bool,
            "string" | "str" => LogicalType::String,
            "datetime" => LogicalType::Datetime,
            "datetime-tz" | "datetimetz" => LogicalType::DatetimeTz,
            "json" => LogicalType::Json,
            "numeric" => LogicalType::NUMERIC,
            "uuid" => LogicalType::Uuid,
            "bytes" => LogicalType::Bytes,
            "geometry" => LogicalType::Geometry,
            other if other.starts_with("numeric") => LogicalType::from_native(other),
            other => LogicalType::from_native(other),
        };
        Ok(parsed)
    }
}

impl Serialize for LogicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LogicalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(LogicalType::String))
    }
}
