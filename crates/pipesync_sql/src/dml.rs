//! DML rendering: inserts, the per-capability update-application
//! strategies, and native upserts.

use crate::error::{SqlBuildError, SqlBuildResult};
use crate::quote::{literal, quote_ident, table_ref};
use pipesync_batch::Batch;
use pipesync_types::{Flavor, LogicalType, SentinelPolicy};
use std::collections::BTreeMap;

/// Default number of rows per `INSERT ... VALUES` statement.
pub const DEFAULT_INSERT_CHUNK: usize = 500;

/// Everything needed to apply an update batch staged in a patch table.
#[derive(Debug, Clone)]
pub struct UpdateSpec<'a> {
    /// The table being updated.
    pub target: &'a str,
    /// The staged patch table holding replacement rows.
    pub patch: &'a str,
    /// Join-key columns.
    pub key_cols: &'a [&'a str],
    /// Non-key columns to overwrite.
    pub value_cols: &'a [&'a str],
    /// Dtypes for sentinel selection on the key columns.
    pub dtypes: &'a BTreeMap<String, LogicalType>,
}

/// Builds the join predicate between two aliases.
///
/// Under the default policy every key column is wrapped in `COALESCE`
/// with its type sentinel on both sides, so NULL keys match each other
/// instead of silently dropping out of the join. A policy with NULL
/// matching disabled renders plain equality and keeps SQL semantics:
/// NULL keys never match.
pub fn join_condition(
    flavor: Flavor,
    left: &str,
    right: &str,
    key_cols: &[&str],
    dtypes: &BTreeMap<String, LogicalType>,
    policy: &SentinelPolicy,
) -> String {
    if !policy.match_nulls {
        return key_cols
            .iter()
            .map(|col| {
                let col_sql = quote_ident(flavor, col);
                format!("{left}.{col_sql} = {right}.{col_sql}")
            })
            .collect::<Vec<_>>()
            .join(" AND ");
    }
    key_cols
        .iter()
        .map(|col| {
            let dtype = dtypes.get(*col).copied().unwrap_or(LogicalType::String);
            let sentinel = policy.literal_for(&dtype, flavor);
            let col_sql = quote_ident(flavor, col);
            format!(
                "COALESCE({left}.{col_sql}, {sentinel}) = COALESCE({right}.{col_sql}, {sentinel})"
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Renders multi-row `INSERT ... VALUES` statements, chunked.
pub fn insert_rows(
    flavor: Flavor,
    table: &str,
    batch: &Batch,
    chunksize: usize,
) -> SqlBuildResult<Vec<String>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let chunksize = if chunksize == 0 {
        DEFAULT_INSERT_CHUNK
    } else {
        chunksize
    };
    let col_list: Vec<String> = batch
        .column_names()
        .iter()
        .map(|c| quote_ident(flavor, c))
        .collect();
    let header = format!(
        "INSERT INTO {} ({}) VALUES ",
        table_ref(flavor, table),
        col_list.join(", ")
    );

    let mut statements = Vec::new();
    let mut rows = Vec::new();
    for row in 0..batch.num_rows() {
        let values: Vec<String> = batch
            .row(row)
            .iter()
            .map(|cell| literal(flavor, cell))
            .collect();
        rows.push(format!("({})", values.join(", ")));
        if rows.len() == chunksize {
            statements.push(format!("{header}{}", rows.join(", ")));
            rows.clear();
        }
    }
    if !rows.is_empty() {
        statements.push(format!("{header}{}", rows.join(", ")));
    }
    Ok(statements)
}

/// Renders the statements that apply staged updates to the target,
/// selected per backend capability:
///
/// - native `MERGE` (MSSQL, Oracle)
/// - join-based `UPDATE` (PostgreSQL family, MySQL family, DuckDB)
/// - explicit `DELETE` of matching rows plus `INSERT` of replacements
///   (SQLite)
pub fn update_rows(
    flavor: Flavor,
    spec: &UpdateSpec<'_>,
    policy: &SentinelPolicy,
) -> SqlBuildResult<Vec<String>> {
    if spec.key_cols.is_empty() {
        return Err(SqlBuildError::no_join_columns("update"));
    }
    if spec.value_cols.is_empty() {
        return Err(SqlBuildError::NoValueColumns {
            table: spec.target.to_string(),
        });
    }

    if flavor.supports_merge() {
        return Ok(vec![merge_statement(flavor, spec, policy)]);
    }

    if flavor.is_mysql_family() {
        let condition = join_condition(flavor, "t", "p", spec.key_cols, spec.dtypes, policy);
        let sets: Vec<String> = spec
            .value_cols
            .iter()
            .map(|col| {
                let col_sql = quote_ident(flavor, col);
                format!("t.{col_sql} = p.{col_sql}")
            })
            .collect();
        return Ok(vec![format!(
            "UPDATE {} t JOIN {} p ON {condition} SET {}",
            table_ref(flavor, spec.target),
            table_ref(flavor, spec.patch),
            sets.join(", ")
        )]);
    }

    if flavor.supports_update_join() {
        // PostgreSQL family and DuckDB: UPDATE ... FROM.
        let condition = join_condition(flavor, "t", "p", spec.key_cols, spec.dtypes, policy);
        let sets: Vec<String> = spec
            .value_cols
            .iter()
            .map(|col| {
                let col_sql = quote_ident(flavor, col);
                format!("{col_sql} = p.{col_sql}")
            })
            .collect();
        return Ok(vec![format!(
            "UPDATE {} AS t SET {} FROM {} AS p WHERE {condition}",
            table_ref(flavor, spec.target),
            sets.join(", "),
            table_ref(flavor, spec.patch)
        )]);
    }

    // Delete-then-insert fallback (SQLite).
    let target_sql = table_ref(flavor, spec.target);
    let patch_sql = table_ref(flavor, spec.patch);
    let condition = join_condition(
        flavor,
        &target_sql,
        "p",
        spec.key_cols,
        spec.dtypes,
        policy,
    );
    let all_cols: Vec<String> = spec
        .key_cols
        .iter()
        .chain(spec.value_cols.iter())
        .map(|c| quote_ident(flavor, c))
        .collect();
    Ok(vec![
        format!(
            "DELETE FROM {target_sql} WHERE EXISTS (SELECT 1 FROM {patch_sql} p WHERE {condition})"
        ),
        format!(
            "INSERT INTO {target_sql} ({cols}) SELECT {cols} FROM {patch_sql}",
            cols = all_cols.join(", ")
        ),
    ])
}

/// Renders a native upsert of the batch into the target.
///
/// `ON CONFLICT DO UPDATE` on the PostgreSQL family, SQLite, and DuckDB;
/// `ON DUPLICATE KEY UPDATE` on the MySQL family; inline-source `MERGE`
/// on MSSQL and Oracle.
pub fn upsert_rows(
    flavor: Flavor,
    table: &str,
    batch: &Batch,
    key_cols: &[&str],
    dtypes: &BTreeMap<String, LogicalType>,
    policy: &SentinelPolicy,
) -> SqlBuildResult<Vec<String>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    if key_cols.is_empty() {
        return Err(SqlBuildError::no_join_columns("upsert"));
    }
    for col in key_cols {
        if !batch.has_column(col) {
            return Err(SqlBuildError::MissingColumn {
                column: (*col).to_string(),
            });
        }
    }

    let value_cols: Vec<&str> = batch
        .column_names()
        .into_iter()
        .filter(|c| !key_cols.contains(c))
        .collect();

    if flavor.supports_merge() {
        let spec = UpdateSpec {
            target: table,
            patch: "",
            key_cols,
            value_cols: &value_cols,
            dtypes,
        };
        return Ok(vec![merge_from_values(flavor, &spec, batch, policy)]);
    }

    let inserts = insert_rows(flavor, table, batch, batch.num_rows())?;
    let insert = inserts.into_iter().next().ok_or(SqlBuildError::EmptyBatch)?;

    if flavor.is_mysql_family() {
        let clause = if value_cols.is_empty() {
            // Degenerate key-only upsert: overwrite a key with itself.
            let col = quote_ident(flavor, key_cols[0]);
            format!("{col} = VALUES({col})")
        } else {
            value_cols
                .iter()
                .map(|col| {
                    let col_sql = quote_ident(flavor, col);
                    format!("{col_sql} = VALUES({col_sql})")
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Ok(vec![format!("{insert} ON DUPLICATE KEY UPDATE {clause}")]);
    }

    // ON CONFLICT for the PostgreSQL family, SQLite, and DuckDB.
    let conflict_cols: Vec<String> = key_cols.iter().map(|c| quote_ident(flavor, c)).collect();
    let clause = if value_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets: Vec<String> = value_cols
            .iter()
            .map(|col| {
                let col_sql = quote_ident(flavor, col);
                format!("{col_sql} = EXCLUDED.{col_sql}")
            })
            .collect();
        format!("DO UPDATE SET {}", sets.join(", "))
    };
    Ok(vec![format!(
        "{insert} ON CONFLICT ({}) {clause}",
        conflict_cols.join(", ")
    )])
}

/// Builds the update-only patch-table MERGE. Unseen rows are inserted
/// separately, so the statement carries no insert clause.
fn merge_statement(flavor: Flavor, spec: &UpdateSpec<'_>, policy: &SentinelPolicy) -> String {
    let condition = join_condition(flavor, "t", "p", spec.key_cols, spec.dtypes, policy);
    let sets: Vec<String> = spec
        .value_cols
        .iter()
        .map(|col| {
            let col_sql = quote_ident(flavor, col);
            format!("t.{col_sql} = p.{col_sql}")
        })
        .collect();
    let mut statement = match flavor {
        Flavor::Oracle => format!(
            "MERGE INTO {} t USING {} p ON ({condition}) WHEN MATCHED THEN UPDATE SET {}",
            table_ref(flavor, spec.target),
            table_ref(flavor, spec.patch),
            sets.join(", ")
        ),
        _ => format!(
            "MERGE INTO {} AS t USING {} AS p ON {condition} WHEN MATCHED THEN UPDATE SET {}",
            table_ref(flavor, spec.target),
            table_ref(flavor, spec.patch),
            sets.join(", ")
        ),
    };
    if flavor == Flavor::Mssql {
        statement.push(';');
    }
    statement
}

/// Builds a MERGE whose source is inline VALUES (MSSQL) or a chain of
/// `SELECT ... FROM dual` (Oracle), for native upserts without a staged
/// patch table.
fn merge_from_values(
    flavor: Flavor,
    spec: &UpdateSpec<'_>,
    batch: &Batch,
    policy: &SentinelPolicy,
) -> String {
    let col_names: Vec<&str> = batch.column_names();
    let quoted: Vec<String> = col_names.iter().map(|c| quote_ident(flavor, c)).collect();
    let condition = join_condition(flavor, "t", "p", spec.key_cols, spec.dtypes, policy);
    let sets: Vec<String> = spec
        .value_cols
        .iter()
        .map(|col| {
            let col_sql = quote_ident(flavor, col);
            format!("t.{col_sql} = p.{col_sql}")
        })
        .collect();
    let matched = if sets.is_empty() {
        String::new()
    } else {
        format!(" WHEN MATCHED THEN UPDATE SET {}", sets.join(", "))
    };

    let source = match flavor {
        Flavor::Oracle => {
            let selects: Vec<String> = (0..batch.num_rows())
                .map(|row| {
                    let parts: Vec<String> = batch
                        .row(row)
                        .iter()
                        .zip(&quoted)
                        .map(|(cell, col)| format!("{} AS {col}", literal(flavor, cell)))
                        .collect();
                    format!("SELECT {} FROM dual", parts.join(", "))
                })
                .collect();
            format!("({}) p", selects.join(" UNION ALL "))
        }
        _ => {
            let rows: Vec<String> = (0..batch.num_rows())
                .map(|row| {
                    let values: Vec<String> = batch
                        .row(row)
                        .iter()
                        .map(|cell| literal(flavor, cell))
                        .collect();
                    format!("({})", values.join(", "))
                })
                .collect();
            format!("(VALUES {}) AS p ({})", rows.join(", "), quoted.join(", "))
        }
    };

    let on_clause = match flavor {
        Flavor::Oracle => format!("({condition})"),
        _ => condition,
    };
    let mut statement = format!(
        "MERGE INTO {} t USING {source} ON {on_clause}{matched}",
        table_ref(flavor, spec.target)
    );
    statement.push_str(&merge_insert_clause(flavor, spec));
    if flavor == Flavor::Mssql {
        statement.push(';');
    }
    statement
}

/// Builds the `WHEN NOT MATCHED THEN INSERT` tail for a patch-table
/// MERGE.
fn merge_insert_clause(flavor: Flavor, spec: &UpdateSpec<'_>) -> String {
    let cols: Vec<String> = spec
        .key_cols
        .iter()
        .chain(spec.value_cols.iter())
        .map(|c| quote_ident(flavor, c))
        .collect();
    let vals: Vec<String> = spec
        .key_cols
        .iter()
        .chain(spec.value_cols.iter())
        .map(|c| format!("p.{}", quote_ident(flavor, c)))
        .collect();
    format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        cols.join(", "),
        vals.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesync_batch::Cell;

    fn batch() -> Batch {
        Batch::from_rows(
            &["id", "val"],
            vec![
                vec![Cell::Int(1), Cell::Text("a".into())],
                vec![Cell::Int(2), Cell::Text("b".into())],
            ],
        )
        .unwrap()
    }

    fn dtypes() -> BTreeMap<String, LogicalType> {
        BTreeMap::from([
            ("id".to_string(), LogicalType::Int),
            ("val".to_string(), LogicalType::String),
        ])
    }

    #[test]
    fn insert_values_chunked() {
        let statements = insert_rows(Flavor::Postgres, "t", &batch(), 1).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "INSERT INTO \"t\" (\"id\", \"val\") VALUES (1, 'a')"
        );

        let single = insert_rows(Flavor::Postgres, "t", &batch(), 100).unwrap();
        assert_eq!(single.len(), 1);
        assert!(single[0].ends_with("VALUES (1, 'a'), (2, 'b')"));
    }

    #[test]
    fn empty_batch_inserts_nothing() {
        let empty = Batch::empty(&["id"]);
        assert!(insert_rows(Flavor::Postgres, "t", &empty, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn join_condition_wraps_both_sides_in_coalesce() {
        let condition = join_condition(
            Flavor::Postgres,
            "t",
            "p",
            &["id"],
            &dtypes(),
            &SentinelPolicy::default(),
        );
        assert_eq!(
            condition,
            "COALESCE(t.\"id\", -987654321) = COALESCE(p.\"id\", -987654321)"
        );
    }

    #[test]
    fn join_condition_without_null_matching_is_plain_equality() {
        let policy = SentinelPolicy::default().without_null_matching();
        let condition = join_condition(Flavor::Postgres, "t", "p", &["id"], &dtypes(), &policy);
        assert_eq!(condition, "t.\"id\" = p.\"id\"");
        assert!(!condition.contains("COALESCE"));
    }

    #[test]
    fn update_via_update_from_on_postgres() {
        let d = dtypes();
        let spec = UpdateSpec {
            target: "t",
            patch: "patch",
            key_cols: &["id"],
            value_cols: &["val"],
            dtypes: &d,
        };
        let statements = update_rows(Flavor::Postgres, &spec, &SentinelPolicy::default()).unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("UPDATE \"t\" AS t SET \"val\" = p.\"val\" FROM"));
        assert!(statements[0].contains("COALESCE(t.\"id\""));
    }

    #[test]
    fn update_via_join_on_mysql() {
        let d = dtypes();
        let spec = UpdateSpec {
            target: "t",
            patch: "patch",
            key_cols: &["id"],
            value_cols: &["val"],
            dtypes: &d,
        };
        let statements = update_rows(Flavor::Mysql, &spec, &SentinelPolicy::default()).unwrap();
        assert!(statements[0].starts_with("UPDATE `t` t JOIN `patch` p ON"));
        assert!(statements[0].ends_with("SET t.`val` = p.`val`"));
    }

    #[test]
    fn update_via_merge_on_mssql() {
        let d = dtypes();
        let spec = UpdateSpec {
            target: "t",
            patch: "patch",
            key_cols: &["id"],
            value_cols: &["val"],
            dtypes: &d,
        };
        let statements = update_rows(Flavor::Mssql, &spec, &SentinelPolicy::default()).unwrap();
        assert!(statements[0].starts_with("MERGE INTO [t] AS t USING [patch] AS p ON"));
        assert!(statements[0].contains("WHEN MATCHED THEN UPDATE SET t.[val] = p.[val]"));
        // Update-only: unseen rows are inserted by a separate statement.
        assert!(!statements[0].contains("WHEN NOT MATCHED"));
        assert!(statements[0].ends_with(';'));
    }

    #[test]
    fn update_via_delete_insert_on_sqlite() {
        let d = dtypes();
        let spec = UpdateSpec {
            target: "t",
            patch: "patch",
            key_cols: &["id"],
            value_cols: &["val"],
            dtypes: &d,
        };
        let statements = update_rows(Flavor::Sqlite, &spec, &SentinelPolicy::default()).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("DELETE FROM \"t\" WHERE EXISTS"));
        assert!(statements[1].starts_with("INSERT INTO \"t\""));
    }

    #[test]
    fn update_requires_keys_and_values() {
        let d = dtypes();
        let no_keys = UpdateSpec {
            target: "t",
            patch: "p",
            key_cols: &[],
            value_cols: &["val"],
            dtypes: &d,
        };
        assert!(update_rows(Flavor::Postgres, &no_keys, &SentinelPolicy::default()).is_err());

        let no_values = UpdateSpec {
            target: "t",
            patch: "p",
            key_cols: &["id"],
            value_cols: &[],
            dtypes: &d,
        };
        assert!(update_rows(Flavor::Postgres, &no_values, &SentinelPolicy::default()).is_err());
    }

    #[test]
    fn upsert_on_conflict_postgres() {
        let statements = upsert_rows(
            Flavor::Postgres,
            "t",
            &batch(),
            &["id"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("ON CONFLICT (\"id\") DO UPDATE SET \"val\" = EXCLUDED.\"val\""));
    }

    #[test]
    fn upsert_on_duplicate_key_mysql() {
        let statements = upsert_rows(
            Flavor::Mysql,
            "t",
            &batch(),
            &["id"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        assert!(statements[0].contains("ON DUPLICATE KEY UPDATE `val` = VALUES(`val`)"));
    }

    #[test]
    fn upsert_merge_mssql_inline_values() {
        let statements = upsert_rows(
            Flavor::Mssql,
            "t",
            &batch(),
            &["id"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        let sql = &statements[0];
        assert!(sql.starts_with("MERGE INTO [t] t USING (VALUES (1, N'a'), (2, N'b')) AS p"));
        assert!(sql.contains("WHEN NOT MATCHED THEN INSERT ([id], [val]) VALUES (p.[id], p.[val])"));
    }

    #[test]
    fn upsert_merge_oracle_dual_chain() {
        let statements = upsert_rows(
            Flavor::Oracle,
            "t",
            &batch(),
            &["id"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        assert!(statements[0].contains("FROM dual"));
        assert!(statements[0].contains("UNION ALL"));
    }

    #[test]
    fn upsert_missing_key_column_is_an_error() {
        let result = upsert_rows(
            Flavor::Postgres,
            "t",
            &batch(),
            &["missing"],
            &dtypes(),
            &SentinelPolicy::default(),
        );
        assert!(result.is_err());
    }
}
