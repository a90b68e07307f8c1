//! DDL rendering: table creation, column add/widen, indices,
//! hypertables, existence probes.

use crate::quote::{quote_ident, table_ref};
use pipesync_types::{Flavor, LogicalType};

/// Renders a plain `CREATE TABLE` from an ordered column list.
pub fn create_table(flavor: Flavor, table: &str, columns: &[(String, LogicalType)]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|(name, dtype)| format!("{} {}", quote_ident(flavor, name), dtype.to_native(flavor)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        table_ref(flavor, table),
        cols.join(", ")
    )
}

/// Renders table-from-select creation.
///
/// Backends with `CREATE TABLE AS` get one statement; MSSQL gets the
/// `SELECT ... INTO` rewrite.
pub fn create_table_as(flavor: Flavor, table: &str, select: &str) -> Vec<String> {
    if flavor.supports_create_table_as() {
        vec![format!(
            "CREATE TABLE {} AS {select}",
            table_ref(flavor, table)
        )]
    } else {
        vec![format!(
            "SELECT src.* INTO {} FROM ({select}) AS src",
            table_ref(flavor, table)
        )]
    }
}

/// Renders `ALTER TABLE ADD COLUMN` for newly discovered columns.
///
/// One multi-column statement where the backend allows it, one statement
/// per column otherwise.
pub fn add_columns(
    flavor: Flavor,
    table: &str,
    columns: &[(String, LogicalType)],
) -> Vec<String> {
    if columns.is_empty() {
        return Vec::new();
    }
    let clause = |name: &str, dtype: &LogicalType| {
        format!("{} {}", quote_ident(flavor, name), dtype.to_native(flavor))
    };
    if flavor.supports_multi_add_column() {
        let statement = match flavor {
            // Oracle takes a parenthesized list after a single ADD.
            Flavor::Oracle => {
                let adds: Vec<String> =
                    columns.iter().map(|(n, d)| clause(n, d)).collect();
                format!(
                    "ALTER TABLE {} ADD ({})",
                    table_ref(flavor, table),
                    adds.join(", ")
                )
            }
            // MSSQL takes a bare comma list after a single ADD.
            Flavor::Mssql => {
                let adds: Vec<String> =
                    columns.iter().map(|(n, d)| clause(n, d)).collect();
                format!(
                    "ALTER TABLE {} ADD {}",
                    table_ref(flavor, table),
                    adds.join(", ")
                )
            }
            // PostgreSQL and MySQL repeat the ADD keyword per column.
            _ => {
                let adds: Vec<String> = columns
                    .iter()
                    .map(|(n, d)| format!("ADD {}", clause(n, d)))
                    .collect();
                format!("ALTER TABLE {} {}", table_ref(flavor, table), adds.join(", "))
            }
        };
        vec![statement]
    } else {
        columns
            .iter()
            .map(|(name, dtype)| {
                format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table_ref(flavor, table),
                    clause(name, dtype)
                )
            })
            .collect()
    }
}

/// Renders the statements to widen a column to a broader logical type.
///
/// Direct `ALTER COLUMN TYPE` where the backend has it; otherwise the
/// add-temp-column / copy / drop-old / rename-new sequence.
pub fn widen_column(flavor: Flavor, table: &str, column: &str, to: &LogicalType) -> Vec<String> {
    let native = to.to_native(flavor);
    let table_sql = table_ref(flavor, table);
    let col_sql = quote_ident(flavor, column);

    if flavor.supports_alter_column_type() {
        let statement = if flavor.is_postgres_family() {
            format!(
                "ALTER TABLE {table_sql} ALTER COLUMN {col_sql} TYPE {native} USING {col_sql}::{native}"
            )
        } else if flavor.is_mysql_family() {
            format!("ALTER TABLE {table_sql} MODIFY COLUMN {col_sql} {native}")
        } else {
            match flavor {
                Flavor::Oracle => format!("ALTER TABLE {table_sql} MODIFY ({col_sql} {native})"),
                Flavor::Duckdb => format!(
                    "ALTER TABLE {table_sql} ALTER COLUMN {col_sql} SET DATA TYPE {native}"
                ),
                _ => format!("ALTER TABLE {table_sql} ALTER COLUMN {col_sql} {native}"),
            }
        };
        return vec![statement];
    }

    // SQLite path: stage through a temporary column.
    let staged = format!("{column}__widened");
    let staged_sql = quote_ident(flavor, &staged);
    vec![
        format!("ALTER TABLE {table_sql} ADD COLUMN {staged_sql} {native}"),
        format!("UPDATE {table_sql} SET {staged_sql} = {col_sql}"),
        format!("ALTER TABLE {table_sql} DROP COLUMN {col_sql}"),
        format!("ALTER TABLE {table_sql} RENAME COLUMN {staged_sql} TO {col_sql}"),
    ]
}

/// Renders a composite index creation statement.
pub fn create_index(
    flavor: Flavor,
    table: &str,
    index_name: &str,
    columns: &[&str],
    unique: bool,
) -> String {
    let unique_kw = if unique { "UNIQUE " } else { "" };
    let if_not_exists = if flavor.supports_if_not_exists_index() {
        "IF NOT EXISTS "
    } else {
        ""
    };
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(flavor, c)).collect();
    format!(
        "CREATE {unique_kw}INDEX {if_not_exists}{} ON {} ({})",
        quote_ident(flavor, index_name),
        table_ref(flavor, table),
        cols.join(", ")
    )
}

/// Registers a TimescaleDB hypertable on the datetime axis.
///
/// Only meaningful on the Timescale flavor; callers gate on
/// [`Flavor::supports_hypertables`].
pub fn create_hypertable(flavor: Flavor, table: &str, datetime_col: &str) -> String {
    format!(
        "SELECT create_hypertable('{}', '{}', if_not_exists => true, migrate_data => true)",
        table_ref(flavor, table).replace('\'', "''"),
        datetime_col.replace('\'', "''")
    )
}

/// Registers a Citus distributed table on the given distribution column.
pub fn create_distributed_table(flavor: Flavor, table: &str, dist_col: &str) -> String {
    format!(
        "SELECT create_distributed_table('{}', '{}')",
        table_ref(flavor, table).replace('\'', "''"),
        dist_col.replace('\'', "''")
    )
}

/// Renders `DROP TABLE`, with `IF EXISTS` where the backend accepts it.
pub fn drop_table(flavor: Flavor, table: &str) -> String {
    match flavor {
        Flavor::Oracle => format!("DROP TABLE {}", table_ref(flavor, table)),
        _ => format!("DROP TABLE IF EXISTS {}", table_ref(flavor, table)),
    }
}

/// Renders a probe returning one row when the table exists.
pub fn table_exists_query(flavor: Flavor, table: &str) -> String {
    let escaped = table.replace('\'', "''");
    match flavor {
        Flavor::Sqlite => format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '{escaped}'"
        ),
        Flavor::Oracle => format!(
            "SELECT table_name FROM user_tables WHERE table_name = '{}'",
            escaped.to_ascii_uppercase()
        ),
        _ => format!(
            "SELECT table_name FROM information_schema.tables WHERE table_name = '{escaped}'"
        ),
    }
}

/// Renders a query returning (column name, native type) per column.
pub fn columns_query(flavor: Flavor, table: &str) -> String {
    let escaped = table.replace('\'', "''");
    match flavor {
        Flavor::Sqlite => format!("SELECT name, type FROM pragma_table_info('{escaped}')"),
        Flavor::Oracle => format!(
            "SELECT column_name, data_type FROM user_tab_columns WHERE table_name = '{}'",
            escaped.to_ascii_uppercase()
        ),
        _ => format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_name = '{escaped}' ORDER BY ordinal_position"
        ),
    }
}
