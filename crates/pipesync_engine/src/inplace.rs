//! The in-place sync driver.
//!
//! When a pipe's source is a SQL query on the same backend as its
//! target, the rows never come through memory: the definition and a
//! backtrack window of the target are staged into ephemeral tables and
//! the diff is a pair of joins. Stage tables are dropped on success and
//! failure alike.

use crate::error::{EngineError, EngineResult};
use pipesync_connector::{SqlClient, SyncReceipt, SyncWindow};
use pipesync_core::Pipe;
use pipesync_sql::inplace::{
    stage_backtrack, stage_definition, stage_patch, unseen_select, update_select, StageNames,
};
use pipesync_sql::{ddl, dml, TransactionId};
use pipesync_types::{LogicalType, SentinelPolicy};
use tracing::debug;

/// Runs one in-place sync of `definition` into the pipe's target.
pub fn sync_inplace<C: SqlClient>(
    client: &C,
    pipe: &Pipe,
    definition: &str,
    window: &SyncWindow,
    policy: &SentinelPolicy,
) -> EngineResult<SyncReceipt> {
    let flavor = client.flavor();
    // Pipes that forbid NULL join keys drop the sentinel substitution.
    let policy = if pipe.parameters.null_indices {
        policy.clone()
    } else {
        policy.clone().without_null_matching()
    };
    let dtypes = &pipe.parameters.dtypes;
    if dtypes.is_empty() {
        return Err(EngineError::configuration(
            "in-place sync requires declared dtypes",
        ));
    }
    let join_cols: Vec<&str> = pipe
        .join_columns()
        .into_iter()
        .filter(|c| dtypes.contains_key(*c))
        .collect();
    if join_cols.is_empty() {
        return Err(EngineError::configuration(
            "in-place sync requires join columns with declared dtypes",
        ));
    }

    // Role columns first, the rest in declaration order.
    let mut cols: Vec<&str> = pipe
        .parameters
        .columns
        .all_columns()
        .into_iter()
        .filter(|c| dtypes.contains_key(*c))
        .collect();
    for name in dtypes.keys() {
        if !cols.contains(&name.as_str()) {
            cols.push(name);
        }
    }
    let value_cols: Vec<&str> = cols
        .iter()
        .copied()
        .filter(|c| !join_cols.contains(c))
        .collect();

    let target = pipe.target_table();
    let stages = StageNames::for_transaction(&TransactionId::new());

    let result = run_staged(
        client, pipe, definition, window, &policy, &target, &stages, &cols, &join_cols,
        &value_cols,
    );

    // Unconditional cleanup; a failed drop is logged, not propagated
    // over the primary result.
    for statement in pipesync_sql::inplace::cleanup(flavor, &stages) {
        if let Err(error) = client.execute(&statement) {
            debug!(%error, "stage table cleanup failed");
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn run_staged<C: SqlClient>(
    client: &C,
    pipe: &Pipe,
    definition: &str,
    window: &SyncWindow,
    policy: &SentinelPolicy,
    target: &str,
    stages: &StageNames,
    cols: &[&str],
    join_cols: &[&str],
    value_cols: &[&str],
) -> EngineResult<SyncReceipt> {
    let flavor = client.flavor();
    let dtypes = &pipe.parameters.dtypes;

    let exists_probe = ddl::table_exists_query(flavor, target);
    let target_exists = !client
        .query(&exists_probe)
        .map_err(EngineError::from_fetch)?
        .is_empty();
    if !target_exists {
        let ordered: Vec<(String, LogicalType)> = cols
            .iter()
            .map(|c| (c.to_string(), dtypes[*c]))
            .collect();
        client
            .execute(&ddl::create_table(flavor, target, &ordered))
            .map_err(EngineError::from_apply)?;
    }

    for statement in stage_definition(flavor, stages, definition) {
        client.execute(&statement).map_err(EngineError::from_apply)?;
    }
    let datetime_col = pipe.parameters.columns.datetime.as_deref();
    for statement in stage_backtrack(flavor, stages, target, datetime_col, window.begin.as_ref())
    {
        client.execute(&statement).map_err(EngineError::from_apply)?;
    }

    let unseen = unseen_select(flavor, stages, cols, join_cols, dtypes, policy)
        .map_err(|e| EngineError::configuration(e.to_string()))?;
    let inserted = client
        .execute(&pipesync_sql::inplace::insert_select(
            flavor, target, cols, &unseen,
        ))
        .map_err(EngineError::from_apply)?;

    let mut updated = 0;
    if !value_cols.is_empty() {
        let selection = update_select(flavor, stages, cols, join_cols, value_cols, dtypes, policy)
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        for statement in stage_patch(flavor, stages, &selection) {
            client.execute(&statement).map_err(EngineError::from_apply)?;
        }
        let spec = dml::UpdateSpec {
            target,
            patch: &stages.patch,
            key_cols: join_cols,
            value_cols,
            dtypes,
        };
        let statements =
            dml::update_rows(flavor, &spec, policy).map_err(|e| EngineError::configuration(e.to_string()))?;
        for statement in statements {
            updated = client.execute(&statement).map_err(EngineError::from_apply)?;
        }
    }

    debug!(pipe = %pipe.keys, inserted, updated, "in-place sync applied");
    Ok(SyncReceipt::new(inserted, updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesync_connector::RecordingClient;
    use pipesync_core::{ColumnRoles, Pipe, PipeKeys};
    use pipesync_types::Flavor;

    fn pipe() -> Pipe {
        let mut p = Pipe::new(PipeKeys::new("sql_src", "orders"), "sql_main");
        p.parameters.columns = ColumnRoles {
            datetime: Some("dt".into()),
            id: Some("id".into()),
            value: Some("val".into()),
            ..Default::default()
        };
        p.parameters
            .dtypes
            .insert("dt".into(), LogicalType::Datetime);
        p.parameters.dtypes.insert("id".into(), LogicalType::Int);
        p.parameters.dtypes.insert("val".into(), LogicalType::Float);
        p
    }

    fn target_exists_row() -> pipesync_batch::Batch {
        pipesync_batch::Batch::from_rows(
            &["name"],
            vec![vec![pipesync_batch::Cell::Text("t".into())]],
        )
        .unwrap()
    }

    #[test]
    fn stages_join_applies_and_cleans_up() {
        let client = RecordingClient::new(Flavor::Postgres);
        client.script_result(target_exists_row());

        sync_inplace(
            &client,
            &pipe(),
            "SELECT * FROM src_orders",
            &SyncWindow::open(),
            &SentinelPolicy::default(),
        )
        .unwrap();

        let statements = client.statements();
        assert!(statements.iter().any(|s| s.contains("_new\" AS SELECT defn.*")));
        assert!(statements.iter().any(|s| s.contains("1 AS \"__ps_row\"")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO \"pipe_sql_src_orders\"")
                && s.contains("LEFT JOIN")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("UPDATE \"pipe_sql_src_orders\" AS t")));
        // All three stage tables are dropped at the end.
        let drops = statements
            .iter()
            .filter(|s| s.starts_with("DROP TABLE IF EXISTS \"ps_tmp_"))
            .count();
        assert_eq!(drops, 3);
    }

    #[test]
    fn cleanup_runs_even_without_value_columns() {
        let client = RecordingClient::new(Flavor::Postgres);
        client.script_result(target_exists_row());

        let mut p = pipe();
        p.parameters.columns.value = None;
        p.parameters.dtypes.remove("val");

        sync_inplace(
            &client,
            &p,
            "SELECT * FROM src_orders",
            &SyncWindow::open(),
            &SentinelPolicy::default(),
        )
        .unwrap();

        let statements = client.statements();
        assert!(!statements.iter().any(|s| s.contains("_patch\" AS")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("DROP TABLE IF EXISTS \"ps_tmp_")));
    }

    #[test]
    fn null_indices_off_joins_without_sentinels() {
        let client = RecordingClient::new(Flavor::Postgres);
        client.script_result(target_exists_row());

        let mut p = pipe();
        p.parameters.null_indices = false;
        sync_inplace(
            &client,
            &p,
            "SELECT * FROM src_orders",
            &SyncWindow::open(),
            &SentinelPolicy::default(),
        )
        .unwrap();

        let statements = client.statements();
        let unseen = statements
            .iter()
            .find(|s| s.contains("LEFT JOIN"))
            .cloned()
            .unwrap();
        assert!(unseen.contains("n.\"dt\" = b.\"dt\""));
        assert!(!unseen.contains("COALESCE(n.\"dt\""));
    }

    #[test]
    fn missing_dtypes_is_a_configuration_error() {
        let client = RecordingClient::new(Flavor::Postgres);
        let bare = Pipe::new(PipeKeys::new("a", "b"), "sql_main");
        let result = sync_inplace(
            &client,
            &bare,
            "SELECT 1",
            &SyncWindow::open(),
            &SentinelPolicy::default(),
        );
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }
}
