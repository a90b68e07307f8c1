//! Query rendering for in-place syncs.
//!
//! When a pipe's definition is itself a SQL query on the same backend,
//! the diff never leaves the database: the definition and a backtrack
//! window of the target are staged into ephemeral tables, and unseen
//! and update rows are carved out with joins before being applied.

use crate::ddl::{create_table_as, drop_table};
use crate::dml::join_condition;
use crate::error::{SqlBuildError, SqlBuildResult};
use crate::quote::{literal, quote_ident, table_ref};
use crate::txid::TransactionId;
use pipesync_batch::Cell;
use pipesync_types::{Flavor, LogicalType, SentinelPolicy};
use std::collections::BTreeMap;

/// Marker column added to the backtrack stage.
///
/// A LEFT JOIN non-match is detected by this column coming back NULL,
/// which stays correct even when every join column of a backtrack row
/// is legitimately NULL.
pub const ROW_MARKER: &str = "__ps_row";

/// The ephemeral tables used by one in-place attempt.
#[derive(Debug, Clone)]
pub struct StageNames {
    /// Stage of the pipe's definition query.
    pub new: String,
    /// Stage of the target's backtrack window.
    pub backtrack: String,
    /// Stage of the rows selected for update.
    pub patch: String,
}

impl StageNames {
    /// Derives the three stage names from one transaction id.
    pub fn for_transaction(txid: &TransactionId) -> Self {
        Self {
            new: txid.temp_table("new"),
            backtrack: txid.temp_table("bt"),
            patch: txid.temp_table("patch"),
        }
    }
}

/// Renders the statements staging the definition query into the `new`
/// table.
pub fn stage_definition(flavor: Flavor, stages: &StageNames, definition: &str) -> Vec<String> {
    let select = format!("SELECT defn.* FROM ({definition}) defn");
    create_table_as(flavor, &stages.new, &select)
}

/// Renders the statements staging the target's backtrack window, with
/// the row marker attached.
///
/// `begin` of `None` stages the whole target (first sync).
pub fn stage_backtrack(
    flavor: Flavor,
    stages: &StageNames,
    target: &str,
    datetime_col: Option<&str>,
    begin: Option<&Cell>,
) -> Vec<String> {
    let mut select = format!(
        "SELECT {}.*, 1 AS {} FROM {}",
        table_ref(flavor, target),
        quote_ident(flavor, ROW_MARKER),
        table_ref(flavor, target)
    );
    if let (Some(col), Some(begin)) = (datetime_col, begin) {
        select.push_str(&format!(
            " WHERE {} >= {}",
            quote_ident(flavor, col),
            literal(flavor, begin)
        ));
    }
    create_table_as(flavor, &stages.backtrack, &select)
}

/// Renders the SELECT producing rows present in `new` but absent from
/// the backtrack stage.
pub fn unseen_select(
    flavor: Flavor,
    stages: &StageNames,
    cols: &[&str],
    join_cols: &[&str],
    dtypes: &BTreeMap<String, LogicalType>,
    policy: &SentinelPolicy,
) -> SqlBuildResult<String> {
    if join_cols.is_empty() {
        return Err(SqlBuildError::no_join_columns("in-place unseen select"));
    }
    let condition = join_condition(flavor, "n", "b", join_cols, dtypes, policy);
    Ok(format!(
        "SELECT {} FROM {} n LEFT JOIN {} b ON {condition} WHERE b.{} IS NULL",
        projection(flavor, cols),
        table_ref(flavor, &stages.new),
        table_ref(flavor, &stages.backtrack),
        quote_ident(flavor, ROW_MARKER)
    ))
}

/// Explicit `n.`-qualified column list, so staged selects keep a
/// deterministic column order for `INSERT ... SELECT`.
fn projection(flavor: Flavor, cols: &[&str]) -> String {
    cols.iter()
        .map(|c| format!("n.{}", quote_ident(flavor, c)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the SELECT producing rows whose keys match the backtrack
/// stage but whose values differ.
///
/// Value comparison wraps both sides in the type sentinel too, so a
/// NULL-to-value (or value-to-NULL) transition counts as a change.
pub fn update_select(
    flavor: Flavor,
    stages: &StageNames,
    cols: &[&str],
    join_cols: &[&str],
    value_cols: &[&str],
    dtypes: &BTreeMap<String, LogicalType>,
    policy: &SentinelPolicy,
) -> SqlBuildResult<String> {
    if join_cols.is_empty() {
        return Err(SqlBuildError::no_join_columns("in-place update select"));
    }
    if value_cols.is_empty() {
        return Err(SqlBuildError::NoValueColumns {
            table: stages.patch.clone(),
        });
    }
    let condition = join_condition(flavor, "n", "b", join_cols, dtypes, policy);
    let changed: Vec<String> = value_cols
        .iter()
        .map(|col| {
            let dtype = dtypes.get(*col).copied().unwrap_or(LogicalType::String);
            let sentinel = policy.literal_for(&dtype, flavor);
            let col_sql = quote_ident(flavor, col);
            format!("COALESCE(n.{col_sql}, {sentinel}) <> COALESCE(b.{col_sql}, {sentinel})")
        })
        .collect();
    Ok(format!(
        "SELECT {} FROM {} n INNER JOIN {} b ON {condition} WHERE {}",
        projection(flavor, cols),
        table_ref(flavor, &stages.new),
        table_ref(flavor, &stages.backtrack),
        changed.join(" OR ")
    ))
}

/// Renders the statements staging the update selection into the patch
/// table.
pub fn stage_patch(flavor: Flavor, stages: &StageNames, update_select: &str) -> Vec<String> {
    create_table_as(flavor, &stages.patch, update_select)
}

/// Renders `INSERT ... SELECT` moving selected rows into the target.
pub fn insert_select(flavor: Flavor, target: &str, columns: &[&str], select: &str) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(flavor, c)).collect();
    format!(
        "INSERT INTO {} ({}) {select}",
        table_ref(flavor, target),
        cols.join(", ")
    )
}

/// Renders the drops for every stage table.
///
/// Callers run these unconditionally, success or failure, so aborted
/// attempts never leak ephemeral tables.
pub fn cleanup(flavor: Flavor, stages: &StageNames) -> Vec<String> {
    vec![
        drop_table(flavor, &stages.new),
        drop_table(flavor, &stages.backtrack),
        drop_table(flavor, &stages.patch),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> StageNames {
        StageNames {
            new: "ps_tmp_abc_new".to_string(),
            backtrack: "ps_tmp_abc_bt".to_string(),
            patch: "ps_tmp_abc_patch".to_string(),
        }
    }

    fn dtypes() -> BTreeMap<String, LogicalType> {
        BTreeMap::from([
            ("dt".to_string(), LogicalType::Datetime),
            ("id".to_string(), LogicalType::Int),
            ("val".to_string(), LogicalType::Float),
        ])
    }

    #[test]
    fn stage_names_share_one_transaction() {
        let txid = TransactionId::new();
        let s = StageNames::for_transaction(&txid);
        assert!(s.new.ends_with("_new"));
        assert!(s.backtrack.ends_with("_bt"));
        assert!(s.patch.ends_with("_patch"));
        assert_eq!(s.new.len(), s.backtrack.len() + 1);
    }

    #[test]
    fn definition_stage_wraps_subquery() {
        let statements = stage_definition(Flavor::Postgres, &stages(), "SELECT * FROM src");
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE \"ps_tmp_abc_new\" AS SELECT defn.*"));
        assert!(statements[0].contains("(SELECT * FROM src) defn"));
    }

    #[test]
    fn backtrack_stage_carries_row_marker() {
        let begin = Cell::Datetime(
            chrono::NaiveDate::from_ymd_opt(2022, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let statements = stage_backtrack(
            Flavor::Postgres,
            &stages(),
            "pipe_t",
            Some("dt"),
            Some(&begin),
        );
        assert!(statements[0].contains("1 AS \"__ps_row\""));
        assert!(statements[0].contains("WHERE \"dt\" >= '2022-01-01 00:00:00'"));
    }

    #[test]
    fn backtrack_stage_without_bound_takes_whole_target() {
        let statements = stage_backtrack(Flavor::Postgres, &stages(), "pipe_t", None, None);
        assert!(!statements[0].contains("WHERE"));
    }

    #[test]
    fn unseen_select_uses_marker_not_keys_for_non_match() {
        let sql = unseen_select(
            Flavor::Postgres,
            &stages(),
            &["dt", "id", "val"],
            &["dt", "id"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        assert!(sql.starts_with("SELECT n.\"dt\", n.\"id\", n.\"val\" FROM"));
        assert!(sql.contains("LEFT JOIN"));
        assert!(sql.ends_with("WHERE b.\"__ps_row\" IS NULL"));
        assert!(sql.contains("COALESCE(n.\"id\""));
    }

    #[test]
    fn update_select_compares_values_null_safely() {
        let sql = update_select(
            Flavor::Postgres,
            &stages(),
            &["dt", "id", "val"],
            &["id"],
            &["val"],
            &dtypes(),
            &SentinelPolicy::default(),
        )
        .unwrap();
        assert!(sql.contains("INNER JOIN"));
        assert!(sql.contains("COALESCE(n.\"val\", -987654321) <> COALESCE(b.\"val\", -987654321)"));
    }

    #[test]
    fn update_select_requires_value_columns() {
        let result = update_select(
            Flavor::Postgres,
            &stages(),
            &["dt", "id", "val"],
            &["id"],
            &[],
            &dtypes(),
            &SentinelPolicy::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn insert_select_lists_columns() {
        let sql = insert_select(Flavor::Postgres, "pipe_t", &["id", "val"], "SELECT 1, 2");
        assert_eq!(sql, "INSERT INTO \"pipe_t\" (\"id\", \"val\") SELECT 1, 2");
    }

    #[test]
    fn cleanup_drops_every_stage() {
        let statements = cleanup(Flavor::Postgres, &stages());
        assert_eq!(statements.len(), 3);
        assert!(statements.iter().all(|s| s.starts_with("DROP TABLE IF EXISTS")));
    }
}
