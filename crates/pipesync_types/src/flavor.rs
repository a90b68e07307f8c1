//! Backend flavors and their capability surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an unknown flavor name.
#[derive(Debug, Error)]
#[error("unknown backend flavor: {0}")]
pub struct UnknownFlavor(pub String);

/// A supported SQL backend.
///
/// Each flavor carries its dialect quirks as capability methods so the
/// query builder and the orchestrator can branch at compile time instead
/// of looking up per-backend functions at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// PostgreSQL.
    Postgres,
    /// TimescaleDB (PostgreSQL dialect plus hypertables).
    Timescale,
    /// Citus (PostgreSQL dialect plus distributed tables).
    Citus,
    /// CockroachDB (PostgreSQL wire dialect).
    Cockroach,
    /// MySQL.
    Mysql,
    /// MariaDB.
    Mariadb,
    /// Microsoft SQL Server.
    Mssql,
    /// Oracle Database.
    Oracle,
    /// SQLite.
    Sqlite,
    /// DuckDB.
    Duckdb,
}

impl Flavor {
    /// All supported flavors, in declaration order.
    pub const ALL: [Flavor; 10] = [
        Flavor::Postgres,
        Flavor::Timescale,
        Flavor::Citus,
        Flavor::Cockroach,
        Flavor::Mysql,
        Flavor::Mariadb,
        Flavor::Mssql,
        Flavor::Oracle,
        Flavor::Sqlite,
        Flavor::Duckdb,
    ];

    /// Returns true if this flavor speaks the PostgreSQL dialect.
    pub fn is_postgres_family(&self) -> bool {
        matches!(
            self,
            Flavor::Postgres | Flavor::Timescale | Flavor::Citus | Flavor::Cockroach
        )
    }

    /// Returns true if this flavor speaks the MySQL dialect.
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Flavor::Mysql | Flavor::Mariadb)
    }

    /// The opening quote character for identifiers.
    pub fn quote_open(&self) -> char {
        match self {
            Flavor::Mysql | Flavor::Mariadb => '`',
            Flavor::Mssql => '[',
            _ => '"',
        }
    }

    /// The closing quote character for identifiers.
    pub fn quote_close(&self) -> char {
        match self {
            Flavor::Mysql | Flavor::Mariadb => '`',
            Flavor::Mssql => ']',
            _ => '"',
        }
    }

    /// Whether the backend supports a native `MERGE` statement.
    pub fn supports_merge(&self) -> bool {
        matches!(self, Flavor::Mssql | Flavor::Oracle)
    }

    /// Whether the backend supports a join-based multi-table `UPDATE`
    /// (`UPDATE ... FROM` or `UPDATE ... JOIN`).
    pub fn supports_update_join(&self) -> bool {
        self.is_postgres_family() || self.is_mysql_family() || matches!(self, Flavor::Duckdb)
    }

    /// Whether several `ADD COLUMN` clauses fit in one `ALTER TABLE`.
    pub fn supports_multi_add_column(&self) -> bool {
        !matches!(self, Flavor::Sqlite | Flavor::Duckdb)
    }

    /// Whether the backend can retype a column in place with
    /// `ALTER TABLE ... ALTER/MODIFY COLUMN`.
    pub fn supports_alter_column_type(&self) -> bool {
        !matches!(self, Flavor::Sqlite)
    }

    /// Whether `CREATE TABLE ... AS SELECT` is valid syntax.
    ///
    /// MSSQL requires the two-step `SELECT ... INTO` form instead.
    pub fn supports_create_table_as(&self) -> bool {
        !matches!(self, Flavor::Mssql)
    }

    /// Whether `CREATE INDEX IF NOT EXISTS` is accepted.
    pub fn supports_if_not_exists_index(&self) -> bool {
        !matches!(self, Flavor::Mssql | Flavor::Oracle)
    }

    /// Whether the backend has a native JSON column type.
    pub fn has_native_json(&self) -> bool {
        self.is_postgres_family() || self.is_mysql_family() || matches!(self, Flavor::Duckdb)
    }

    /// Whether the backend has a native UUID column type.
    pub fn has_native_uuid(&self) -> bool {
        self.is_postgres_family() || matches!(self, Flavor::Duckdb)
    }

    /// Whether the backend supports automatic time-partitioning
    /// (TimescaleDB hypertables).
    pub fn supports_hypertables(&self) -> bool {
        matches!(self, Flavor::Timescale)
    }

    /// Whether the backend supports distributed tables (Citus).
    pub fn supports_distributed_tables(&self) -> bool {
        matches!(self, Flavor::Citus)
    }

    /// Whether the backend supports a native upsert clause.
    pub fn supports_native_upsert(&self) -> bool {
        match self {
            Flavor::Mssql | Flavor::Oracle => true, // via MERGE
            Flavor::Mysql | Flavor::Mariadb => true, // ON DUPLICATE KEY
            f if f.is_postgres_family() => true,    // ON CONFLICT
            Flavor::Sqlite | Flavor::Duckdb => true, // ON CONFLICT
            _ => false,
        }
    }

    /// How many concurrent chunk workers this backend tolerates.
    ///
    /// File-backed embedded engines are single-writer; pooled server
    /// backends allow a small amount of parallelism.
    pub fn concurrency_headroom(&self) -> usize {
        match self {
            Flavor::Sqlite | Flavor::Duckdb => 1,
            _ => 4,
        }
    }

    /// The maximum numeric precision and scale substituted when a
    /// declared `numeric` carries no explicit precision.
    ///
    /// These are the conservative documented maxima, not theoretical
    /// limits (PostgreSQL accepts far wider numerics than anything a
    /// pipe will carry).
    pub fn max_numeric_precision(&self) -> (u8, u8) {
        match self {
            Flavor::Mysql | Flavor::Mariadb => (65, 20),
            Flavor::Mssql | Flavor::Oracle => (38, 10),
            _ => (38, 15),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flavor::Postgres => "postgres",
            Flavor::Timescale => "timescale",
            Flavor::Citus => "citus",
            Flavor::Cockroach => "cockroach",
            Flavor::Mysql => "mysql",
            Flavor::Mariadb => "mariadb",
            Flavor::Mssql => "mssql",
            Flavor::Oracle => "oracle",
            Flavor::Sqlite => "sqlite",
            Flavor::Duckdb => "duckdb",
        };
        f.write_str(name)
    }
}

impl FromStr for Flavor {
    type Err = UnknownFlavor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Flavor::Postgres),
            "timescale" | "timescaledb" => Ok(Flavor::Timescale),
            "citus" => Ok(Flavor::Citus),
            "cockroach" | "cockroachdb" => Ok(Flavor::Cockroach),
            "mysql" => Ok(Flavor::Mysql),
            "mariadb" => Ok(Flavor::Mariadb),
            "mssql" | "sqlserver" => Ok(Flavor::Mssql),
            "oracle" => Ok(Flavor::Oracle),
            "sqlite" => Ok(Flavor::Sqlite),
            "duckdb" => Ok(Flavor::Duckdb),
            other => Err(UnknownFlavor(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_round_trip() {
        for flavor in Flavor::ALL {
            let parsed: Flavor = flavor.to_string().parse().unwrap();
            assert_eq!(parsed, flavor);
        }
    }

    #[test]
    fn flavor_aliases() {
        assert_eq!("postgresql".parse::<Flavor>().unwrap(), Flavor::Postgres);
        assert_eq!("timescaledb".parse::<Flavor>().unwrap(), Flavor::Timescale);
        assert_eq!("sqlserver".parse::<Flavor>().unwrap(), Flavor::Mssql);
        assert!("mongodb".parse::<Flavor>().is_err());
    }

    #[test]
    fn quote_chars() {
        assert_eq!(Flavor::Postgres.quote_open(), '"');
        assert_eq!(Flavor::Mysql.quote_open(), '`');
        assert_eq!(Flavor::Mssql.quote_open(), '[');
        assert_eq!(Flavor::Mssql.quote_close(), ']');
    }

    #[test]
    fn capability_matrix() {
        assert!(Flavor::Mssql.supports_merge());
        assert!(Flavor::Oracle.supports_merge());
        assert!(!Flavor::Postgres.supports_merge());

        assert!(Flavor::Postgres.supports_update_join());
        assert!(Flavor::Mysql.supports_update_join());
        assert!(!Flavor::Sqlite.supports_update_join());

        assert!(!Flavor::Sqlite.supports_alter_column_type());
        assert!(Flavor::Postgres.supports_alter_column_type());

        assert!(!Flavor::Mssql.supports_create_table_as());
        assert!(Flavor::Timescale.supports_hypertables());
        assert!(Flavor::Citus.supports_distributed_tables());
    }

    #[test]
    fn embedded_backends_are_single_worker() {
        assert_eq!(Flavor::Sqlite.concurrency_headroom(), 1);
        assert_eq!(Flavor::Duckdb.concurrency_headroom(), 1);
        assert!(Flavor::Postgres.concurrency_headroom() > 1);
    }
}
