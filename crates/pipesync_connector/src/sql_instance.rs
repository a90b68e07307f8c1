//! The SQL-backed instance connector.

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{InstanceConnector, SqlClient, SyncReceipt};
use crate::window::SyncWindow;
use pipesync_batch::{reconcile, Batch, Cell, Column};
use pipesync_core::{Pipe, PipeKeys, PipeParameters};
use pipesync_sql::{ddl, dml, literal, quote_ident, table_ref, TransactionId};
use pipesync_types::{Flavor, LogicalType, SentinelPolicy};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// The metadata table: one row per registered pipe.
const METADATA_TABLE: &str = "pipes";

/// An instance connector that renders everything through the query
/// builder and executes on a [`SqlClient`].
///
/// The client is the only backend-specific piece; everything here is
/// dialect-parameterized statement text.
pub struct SqlInstance<C: SqlClient> {
    client: C,
    policy: SentinelPolicy,
    metadata_ensured: AtomicBool,
}

impl<C: SqlClient> SqlInstance<C> {
    /// Wraps a client.
    pub fn new(client: C) -> Self {
        Self {
            client,
            policy: SentinelPolicy::default(),
            metadata_ensured: AtomicBool::new(false),
        }
    }

    /// Sets the NULL-replacement policy used in join predicates.
    pub fn with_policy(mut self, policy: SentinelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn dialect(&self) -> Flavor {
        self.client.flavor()
    }

    fn target_table(keys: &PipeKeys) -> String {
        format!("pipe_{}", keys.slug())
    }

    /// The policy for one pipe: pipes that forbid NULL in join columns
    /// get plain-equality predicates instead of sentinel COALESCE.
    fn pipe_policy(&self, pipe: &Pipe) -> SentinelPolicy {
        if pipe.parameters.null_indices {
            self.policy.clone()
        } else {
            self.policy.clone().without_null_matching()
        }
    }

    /// The dtype of the metadata `parameters` column.
    fn document_dtype(&self) -> LogicalType {
        if self.dialect().has_native_json() {
            LogicalType::Json
        } else {
            LogicalType::String
        }
    }

    fn table_exists(&self, table: &str) -> ConnectorResult<bool> {
        let probe = ddl::table_exists_query(self.dialect(), table);
        Ok(!self.client.query(&probe)?.is_empty())
    }

    fn ensure_metadata(&self) -> ConnectorResult<()> {
        if self.metadata_ensured.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.table_exists(METADATA_TABLE)? {
            let columns = vec![
                ("connector".to_string(), LogicalType::String),
                ("metric".to_string(), LogicalType::String),
                ("location".to_string(), LogicalType::String),
                ("parameters".to_string(), self.document_dtype()),
            ];
            self.client
                .execute(&ddl::create_table(self.dialect(), METADATA_TABLE, &columns))?;
        }
        self.metadata_ensured.store(true, Ordering::Release);
        Ok(())
    }

    /// The WHERE predicate selecting one pipe's metadata row.
    fn keys_predicate(&self, keys: &PipeKeys) -> String {
        let flavor = self.dialect();
        let mut parts = vec![
            format!(
                "{} = {}",
                quote_ident(flavor, "connector"),
                literal(flavor, &Cell::Text(keys.connector.clone()))
            ),
            format!(
                "{} = {}",
                quote_ident(flavor, "metric"),
                literal(flavor, &Cell::Text(keys.metric.clone()))
            ),
        ];
        parts.push(match &keys.location {
            Some(location) => format!(
                "{} = {}",
                quote_ident(flavor, "location"),
                literal(flavor, &Cell::Text(location.clone()))
            ),
            None => format!("{} IS NULL", quote_ident(flavor, "location")),
        });
        parts.join(" AND ")
    }

    fn document_cell(&self, parameters: &PipeParameters) -> ConnectorResult<Cell> {
        if self.document_dtype() == LogicalType::Json {
            Ok(Cell::Json(serde_json::to_value(parameters)?))
        } else {
            Ok(Cell::Text(parameters.to_document().map_err(|e| {
                ConnectorError::backend(e.to_string(), false)
            })?))
        }
    }

    /// Reads the target's physical columns as canonical dtypes.
    fn target_columns(&self, table: &str) -> ConnectorResult<BTreeMap<String, LogicalType>> {
        let query = ddl::columns_query(self.dialect(), table);
        let rows = self.client.query(&query)?;
        let mut columns = BTreeMap::new();
        for index in 0..rows.num_rows() {
            let row = rows.row(index);
            let (Some(Cell::Text(name)), Some(Cell::Text(native))) = (row.first(), row.get(1))
            else {
                return Err(ConnectorError::backend(
                    format!("malformed column metadata for {table}"),
                    false,
                ));
            };
            columns.insert(name.clone(), LogicalType::from_native(native));
        }
        Ok(columns)
    }

    /// Orders dtypes for table creation: role columns first, the rest
    /// alphabetically.
    fn ordered_columns(
        pipe: &Pipe,
        dtypes: &BTreeMap<String, LogicalType>,
    ) -> Vec<(String, LogicalType)> {
        let mut ordered = Vec::with_capacity(dtypes.len());
        for role_col in pipe.parameters.columns.all_columns() {
            if let Some(dtype) = dtypes.get(role_col) {
                ordered.push((role_col.to_string(), *dtype));
            }
        }
        for (name, dtype) in dtypes {
            if !ordered.iter().any(|(n, _)| n == name) {
                ordered.push((name.clone(), *dtype));
            }
        }
        ordered
    }

    /// Creates the target table, its indices, and any flavor-specific
    /// table registration (hypertable, distributed table).
    fn create_target(
        &self,
        pipe: &Pipe,
        table: &str,
        dtypes: &BTreeMap<String, LogicalType>,
    ) -> ConnectorResult<()> {
        let flavor = self.dialect();
        let ordered = Self::ordered_columns(pipe, dtypes);
        self.client
            .execute(&ddl::create_table(flavor, table, &ordered))?;

        let join_cols: Vec<&str> = pipe
            .join_columns()
            .into_iter()
            .filter(|c| dtypes.contains_key(*c))
            .collect();
        if !join_cols.is_empty() {
            // A native upsert needs a unique key to conflict on.
            let unique = pipe.parameters.upsert && flavor.supports_native_upsert();
            let index_name = format!("ix_{table}_keys");
            self.client
                .execute(&ddl::create_index(flavor, table, &index_name, &join_cols, unique))?;
        }
        for (name, columns) in &pipe.parameters.indices {
            let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
            let index_name = format!("ix_{table}_{name}");
            self.client
                .execute(&ddl::create_index(flavor, table, &index_name, &cols, false))?;
        }

        if let Some(datetime) = &pipe.parameters.columns.datetime {
            if flavor.supports_hypertables() && dtypes.contains_key(datetime) {
                self.client
                    .execute(&ddl::create_hypertable(flavor, table, datetime))?;
            }
        }
        if let Some(id) = &pipe.parameters.columns.id {
            if flavor.supports_distributed_tables() && dtypes.contains_key(id) {
                self.client
                    .execute(&ddl::create_distributed_table(flavor, table, id))?;
            }
        }
        debug!(table, flavor = %flavor, "created target table");
        Ok(())
    }

    /// Reconciles the physical schema with the incoming dtypes: new
    /// columns are added, narrower columns are widened.
    fn reconcile_schema(
        &self,
        table: &str,
        incoming: &BTreeMap<String, LogicalType>,
    ) -> ConnectorResult<()> {
        let flavor = self.dialect();
        let existing = self.target_columns(table)?;
        if existing.is_empty() {
            // Backend returned no metadata; nothing to reconcile against.
            return Ok(());
        }

        let added: Vec<(String, LogicalType)> = incoming
            .iter()
            .filter(|(name, _)| !existing.contains_key(*name))
            .map(|(name, dtype)| (name.clone(), *dtype))
            .collect();
        if !added.is_empty() {
            for statement in ddl::add_columns(flavor, table, &added) {
                self.client.execute(&statement)?;
            }
        }

        for (name, incoming_dtype) in incoming {
            if let Some(declared) = existing.get(name) {
                if let Some(widened) = declared.widens_to(incoming_dtype) {
                    warn!(
                        table,
                        column = %name,
                        from = %declared,
                        to = %widened,
                        "widening column dtype"
                    );
                    for statement in ddl::widen_column(flavor, table, name, &widened) {
                        self.client.execute(&statement)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Merges the pipe's declared dtypes over the batch's observed ones.
    fn effective_dtypes(pipe: &Pipe, batch: &Batch) -> BTreeMap<String, LogicalType> {
        let mut dtypes = batch.dtypes();
        for (name, dtype) in &pipe.parameters.dtypes {
            dtypes.insert(name.clone(), *dtype);
        }
        dtypes
    }

    fn ensure_target(
        &self,
        pipe: &Pipe,
        table: &str,
        dtypes: &BTreeMap<String, LogicalType>,
    ) -> ConnectorResult<()> {
        if self.table_exists(table)? {
            self.reconcile_schema(table, dtypes)
        } else {
            self.create_target(pipe, table, dtypes)
        }
    }

    /// Applies update rows by staging them into an ephemeral patch table
    /// and running the flavor's update strategy. The patch table is
    /// dropped on success and failure alike.
    fn apply_updates(
        &self,
        table: &str,
        update: &Batch,
        join_cols: &[&str],
        dtypes: &BTreeMap<String, LogicalType>,
        policy: &SentinelPolicy,
        chunksize: usize,
    ) -> ConnectorResult<()> {
        let flavor = self.dialect();
        let patch = TransactionId::new().temp_table("patch");

        let result = (|| -> ConnectorResult<()> {
            let columns: Vec<(String, LogicalType)> = update
                .column_names()
                .iter()
                .map(|name| {
                    let dtype = dtypes.get(*name).copied().unwrap_or(LogicalType::String);
                    (name.to_string(), dtype)
                })
                .collect();
            self.client
                .execute(&ddl::create_table(flavor, &patch, &columns))?;
            for statement in dml::insert_rows(flavor, &patch, update, chunksize)? {
                self.client.execute(&statement)?;
            }

            let value_cols: Vec<&str> = update
                .column_names()
                .into_iter()
                .filter(|c| !join_cols.contains(c))
                .collect();
            let spec = dml::UpdateSpec {
                target: table,
                patch: &patch,
                key_cols: join_cols,
                value_cols: &value_cols,
                dtypes,
            };
            for statement in dml::update_rows(flavor, &spec, policy)? {
                self.client.execute(&statement)?;
            }
            Ok(())
        })();

        let cleanup = self.client.execute(&ddl::drop_table(flavor, &patch));
        result?;
        cleanup?;
        Ok(())
    }
}

impl<C: SqlClient> InstanceConnector for SqlInstance<C> {
    fn flavor(&self) -> Option<Flavor> {
        Some(self.dialect())
    }

    fn register_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
        pipe.validate()?;
        self.ensure_metadata()?;
        if self.pipe_exists(&pipe.keys)? {
            return Err(ConnectorError::AlreadyRegistered {
                keys: pipe.keys.to_string(),
            });
        }

        let row = Batch::new(vec![
            Column::typed(
                "connector",
                LogicalType::String,
                vec![Cell::Text(pipe.keys.connector.clone())],
            ),
            Column::typed(
                "metric",
                LogicalType::String,
                vec![Cell::Text(pipe.keys.metric.clone())],
            ),
            Column::typed(
                "location",
                LogicalType::String,
                vec![pipe
                    .keys
                    .location
                    .clone()
                    .map_or(Cell::Null, Cell::Text)],
            ),
            Column::typed(
                "parameters",
                self.document_dtype(),
                vec![self.document_cell(&pipe.parameters)?],
            ),
        ])?;
        for statement in dml::insert_rows(self.dialect(), METADATA_TABLE, &row, 1)? {
            self.client.execute(&statement)?;
        }

        // The target table can only be created up front when the dtypes
        // are already declared; otherwise first sync creates it.
        if !pipe.parameters.dtypes.is_empty() {
            self.create_target(pipe, &Self::target_table(&pipe.keys), &pipe.parameters.dtypes)?;
        }
        debug!(pipe = %pipe.keys, "registered pipe");
        Ok(())
    }

    fn edit_pipe(&self, pipe: &Pipe) -> ConnectorResult<()> {
        pipe.validate()?;
        self.ensure_metadata()?;
        if !self.pipe_exists(&pipe.keys)? {
            return Err(ConnectorError::pipe_not_found(&pipe.keys));
        }
        let flavor = self.dialect();
        let document = self.document_cell(&pipe.parameters)?;
        self.client.execute(&format!(
            "UPDATE {} SET {} = {} WHERE {}",
            table_ref(flavor, METADATA_TABLE),
            quote_ident(flavor, "parameters"),
            literal(flavor, &document),
            self.keys_predicate(&pipe.keys)
        ))?;
        Ok(())
    }

    fn delete_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
        self.ensure_metadata()?;
        if !self.pipe_exists(keys)? {
            return Err(ConnectorError::pipe_not_found(keys));
        }
        let flavor = self.dialect();
        self.client.execute(&format!(
            "DELETE FROM {} WHERE {}",
            table_ref(flavor, METADATA_TABLE),
            self.keys_predicate(keys)
        ))?;
        self.client
            .execute(&ddl::drop_table(flavor, &Self::target_table(keys)))?;
        Ok(())
    }

    fn drop_pipe(&self, keys: &PipeKeys) -> ConnectorResult<()> {
        self.ensure_metadata()?;
        if !self.pipe_exists(keys)? {
            return Err(ConnectorError::pipe_not_found(keys));
        }
        self.client
            .execute(&ddl::drop_table(self.dialect(), &Self::target_table(keys)))?;
        Ok(())
    }

    fn pipe_exists(&self, keys: &PipeKeys) -> ConnectorResult<bool> {
        self.ensure_metadata()?;
        let flavor = self.dialect();
        let probe = format!(
            "SELECT {} FROM {} WHERE {}",
            quote_ident(flavor, "connector"),
            table_ref(flavor, METADATA_TABLE),
            self.keys_predicate(keys)
        );
        Ok(!self.client.query(&probe)?.is_empty())
    }

    fn get_pipe_attributes(&self, keys: &PipeKeys) -> ConnectorResult<PipeParameters> {
        self.ensure_metadata()?;
        let flavor = self.dialect();
        let query = format!(
            "SELECT {} FROM {} WHERE {}",
            quote_ident(flavor, "parameters"),
            table_ref(flavor, METADATA_TABLE),
            self.keys_predicate(keys)
        );
        let rows = self.client.query(&query)?;
        if rows.is_empty() {
            return Err(ConnectorError::pipe_not_found(keys));
        }
        match rows.row(0).first() {
            Some(Cell::Text(doc)) => Ok(PipeParameters::from_document(doc)?),
            Some(Cell::Json(value)) => Ok(serde_json::from_value(value.clone())?),
            Some(Cell::Null) | None => Ok(PipeParameters::default()),
            Some(other) => Err(ConnectorError::backend(
                format!("unexpected parameter document cell: {other:?}"),
                false,
            )),
        }
    }

    fn get_pipe_columns_types(
        &self,
        keys: &PipeKeys,
    ) -> ConnectorResult<BTreeMap<String, LogicalType>> {
        let table = Self::target_table(keys);
        if !self.table_exists(&table)? {
            return Ok(BTreeMap::new());
        }
        self.target_columns(&table)
    }

    fn get_sync_time(&self, pipe: &Pipe) -> ConnectorResult<Option<Cell>> {
        let axis = pipe
            .parameters
            .columns
            .datetime
            .as_deref()
            .or(pipe.parameters.columns.primary.as_deref());
        let Some(axis) = axis else {
            return Ok(None);
        };
        let table = Self::target_table(&pipe.keys);
        if !self.table_exists(&table)? {
            return Ok(None);
        }
        let flavor = self.dialect();
        let query = format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(flavor, axis),
            table_ref(flavor, &table)
        );
        let rows = self.client.query(&query)?;
        if rows.is_empty() {
            return Ok(None);
        }
        match rows.row(0).first() {
            Some(Cell::Null) | None => Ok(None),
            Some(cell) => Ok(Some((*cell).clone())),
        }
    }

    fn sync_pipe(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        window: &SyncWindow,
        chunksize: usize,
    ) -> ConnectorResult<SyncReceipt> {
        if batch.is_empty() {
            return Ok(SyncReceipt::new(0, 0));
        }
        let flavor = self.dialect();
        let table = Self::target_table(&pipe.keys);
        let dtypes = Self::effective_dtypes(pipe, batch);
        let policy = self.pipe_policy(pipe);
        self.ensure_target(pipe, &table, &dtypes)?;

        let join_cols: Vec<&str> = pipe
            .join_columns()
            .into_iter()
            .filter(|c| batch.has_column(c))
            .collect();

        // Native upsert bypasses the diff entirely.
        if pipe.parameters.upsert && flavor.supports_native_upsert() && !join_cols.is_empty() {
            let mut receipt = SyncReceipt::new(0, 0);
            for chunk in batch.chunks(chunksize.max(1)) {
                for statement in
                    dml::upsert_rows(flavor, &table, &chunk, &join_cols, &dtypes, &policy)?
                {
                    self.client.execute(&statement)?;
                }
                receipt.absorb(&SyncReceipt::new(chunk.num_rows() as u64, 0));
            }
            receipt.message = format!("upserted {} rows", receipt.inserted);
            return Ok(receipt);
        }

        let existing = if join_cols.is_empty() {
            Batch::default()
        } else {
            self.get_pipe_data(pipe, None, window)?
        };
        let diff = reconcile(&existing, batch, &join_cols, &policy);
        let inserted = diff.unseen.num_rows() as u64;
        let updated = diff.update.num_rows() as u64;

        for statement in dml::insert_rows(flavor, &table, &diff.unseen, chunksize.max(1))? {
            self.client.execute(&statement)?;
        }
        if !diff.update.is_empty() {
            self.apply_updates(
                &table,
                &diff.update,
                &join_cols,
                &dtypes,
                &policy,
                chunksize.max(1),
            )?;
        }
        debug!(pipe = %pipe.keys, inserted, updated, "sql sync applied");
        Ok(SyncReceipt::new(inserted, updated))
    }

    fn insert_pipe_rows(
        &self,
        pipe: &Pipe,
        batch: &Batch,
        chunksize: usize,
    ) -> ConnectorResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let table = Self::target_table(&pipe.keys);
        let dtypes = Self::effective_dtypes(pipe, batch);
        self.ensure_target(pipe, &table, &dtypes)?;
        for statement in dml::insert_rows(self.dialect(), &table, batch, chunksize.max(1))? {
            self.client.execute(&statement)?;
        }
        Ok(batch.num_rows() as u64)
    }

    fn get_pipe_data(
        &self,
        pipe: &Pipe,
        select_cols: Option<&[&str]>,
        window: &SyncWindow,
    ) -> ConnectorResult<Batch> {
        let flavor = self.dialect();
        let table = Self::target_table(&pipe.keys);
        let projection = match select_cols {
            Some(cols) => cols
                .iter()
                .map(|c| quote_ident(flavor, c))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_string(),
        };
        let mut query = format!("SELECT {projection} FROM {}", table_ref(flavor, &table));
        if let Some(axis) = pipe.parameters.columns.datetime.as_deref() {
            if let Some(predicate) = window.predicate(flavor, axis) {
                query.push_str(&format!(" WHERE {predicate}"));
            }
        }
        self.client.query(&query)
    }
}
