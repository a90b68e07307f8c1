//! The pipe parameter document and the `Pipe` type.

use crate::error::{PipeError, PipeResult};
use crate::keys::PipeKeys;
use pipesync_types::LogicalType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from logical column roles to physical column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    /// The time axis column, if any. At most one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// The primary key column, if any. At most one; takes precedence as
    /// the diff join key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// An identifier column that participates in the join key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The value column. Never part of the join key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Arbitrary additional named index roles.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ColumnRoles {
    /// Resolves the join columns for diffing: `primary` alone when
    /// declared, otherwise every role column except `value`.
    pub fn join_columns(&self) -> Vec<&str> {
        if let Some(primary) = &self.primary {
            return vec![primary.as_str()];
        }
        let mut cols = Vec::new();
        if let Some(datetime) = &self.datetime {
            cols.push(datetime.as_str());
        }
        if let Some(id) = &self.id {
            cols.push(id.as_str());
        }
        for column in self.extra.values() {
            cols.push(column.as_str());
        }
        cols
    }

    /// All role columns, including `value`, in a stable order:
    /// datetime, primary, id, extras, value.
    pub fn all_columns(&self) -> Vec<&str> {
        let mut cols = Vec::new();
        for column in [&self.datetime, &self.primary, &self.id]
            .into_iter()
            .flatten()
        {
            cols.push(column.as_str());
        }
        for column in self.extra.values() {
            if !cols.contains(&column.as_str()) {
                cols.push(column.as_str());
            }
        }
        if let Some(value) = &self.value {
            if !cols.contains(&value.as_str()) {
                cols.push(value.as_str());
            }
        }
        cols
    }

    /// Validates that no physical column is claimed by two unique roles.
    pub fn validate(&self) -> PipeResult<()> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        let named = [
            ("datetime", &self.datetime),
            ("primary", &self.primary),
            ("id", &self.id),
            ("value", &self.value),
        ];
        for (role, column) in named {
            if let Some(column) = column {
                if let Some(existing) = seen.insert(column.as_str(), role) {
                    return Err(PipeError::DuplicateRole {
                        role: role.to_string(),
                        existing: existing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// How a pipe pulls new data from its source connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchDefinition {
    /// A query string understood by the source connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// A nested pipe reference to fetch from instead of a query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<PipeKeys>,
    /// How far behind the last sync time each fetch re-scans, to catch
    /// late-arriving or changed rows.
    #[serde(default)]
    pub backtrack_minutes: i64,
}

/// A recorded dtype change produced by [`PipeParameters::apply_dtypes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtypeChange {
    /// The column whose dtype changed.
    pub column: String,
    /// The previous dtype, if the column was already declared.
    pub from: Option<LogicalType>,
    /// The new dtype.
    pub to: LogicalType,
}

/// The nested parameter document persisted for each pipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipeParameters {
    /// Role-to-column mapping.
    #[serde(default)]
    pub columns: ColumnRoles,
    /// Physical column name to canonical logical type. Absent columns
    /// are inferred from the first observed batch.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dtypes: BTreeMap<String, LogicalType>,
    /// Named composite index definitions beyond the role columns.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indices: BTreeMap<String, Vec<String>>,
    /// Use backend-native upsert instead of delete/insert-into-temp.
    #[serde(default)]
    pub upsert: bool,
    /// Never widen or alter the schema; reject incompatible data.
    #[serde(default, rename = "static")]
    pub static_schema: bool,
    /// Primary key values are server-assigned when absent.
    #[serde(default)]
    pub autoincrement: bool,
    /// Whether NULL is permitted in index/join columns.
    #[serde(default = "default_true")]
    pub null_indices: bool,
    /// Optional fetch definition for pull-based sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchDefinition>,
}

fn default_true() -> bool {
    true
}

impl PipeParameters {
    /// Merges incoming dtypes into the declared set.
    ///
    /// New columns are added; existing columns widen along the lattice or
    /// stay unchanged. Narrowing cannot happen: the widened type always
    /// holds both sides. Returns the changes so the caller can alter the
    /// physical schema (or reject them, for static pipes).
    pub fn apply_dtypes(&mut self, incoming: &BTreeMap<String, LogicalType>) -> Vec<DtypeChange> {
        let mut changes = Vec::new();
        for (column, incoming_type) in incoming {
            match self.dtypes.get(column) {
                None => {
                    self.dtypes.insert(column.clone(), *incoming_type);
                    changes.push(DtypeChange {
                        column: column.clone(),
                        from: None,
                        to: *incoming_type,
                    });
                }
                Some(declared) => {
                    if let Some(widened) = declared.widens_to(incoming_type) {
                        changes.push(DtypeChange {
                            column: column.clone(),
                            from: Some(*declared),
                            to: widened,
                        });
                        self.dtypes.insert(column.clone(), widened);
                    }
                }
            }
        }
        changes
    }

    /// Serializes the document to its persisted JSON form.
    pub fn to_document(&self) -> PipeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes the persisted JSON form.
    pub fn from_document(document: &str) -> PipeResult<Self> {
        Ok(serde_json::from_str(document)?)
    }
}

/// A pipe: identity keys plus instance plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipe {
    /// The identity triple.
    pub keys: PipeKeys,
    /// The instance connector holding this pipe's metadata and rows.
    pub instance: String,
    /// The parameter document.
    #[serde(default)]
    pub parameters: PipeParameters,
}

impl Pipe {
    /// Creates a pipe on the given instance with default parameters.
    pub fn new(keys: PipeKeys, instance: impl Into<String>) -> Self {
        Self {
            keys,
            instance: instance.into(),
            parameters: PipeParameters::default(),
        }
    }

    /// Sets the parameters.
    pub fn with_parameters(mut self, parameters: PipeParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The physical table name backing this pipe.
    pub fn target_table(&self) -> String {
        format!("pipe_{}", self.keys.slug())
    }

    /// The diff join columns (see [`ColumnRoles::join_columns`]).
    pub fn join_columns(&self) -> Vec<&str> {
        self.parameters.columns.join_columns()
    }

    /// Validates keys and roles together.
    pub fn validate(&self) -> PipeResult<()> {
        self.keys.validate()?;
        self.parameters.columns.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(datetime: Option<&str>, primary: Option<&str>, id: Option<&str>) -> ColumnRoles {
        ColumnRoles {
            datetime: datetime.map(String::from),
            primary: primary.map(String::from),
            id: id.map(String::from),
            value: Some("val".into()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn primary_takes_precedence_for_join() {
        let cols = roles(Some("dt"), Some("pk"), Some("id"));
        assert_eq!(cols.join_columns(), vec!["pk"]);
    }

    #[test]
    fn join_excludes_value_column() {
        let cols = roles(Some("dt"), None, Some("id"));
        assert_eq!(cols.join_columns(), vec!["dt", "id"]);
    }

    #[test]
    fn duplicate_role_columns_rejected() {
        let cols = roles(Some("x"), None, Some("x"));
        assert!(cols.validate().is_err());
    }

    #[test]
    fn apply_dtypes_adds_and_widens() {
        let mut params = PipeParameters::default();
        params.dtypes.insert("x".into(), LogicalType::Int);

        let incoming = BTreeMap::from([
            ("x".to_string(), LogicalType::String),
            ("y".to_string(), LogicalType::Float),
        ]);
        let changes = params.apply_dtypes(&incoming);

        assert_eq!(changes.len(), 2);
        assert_eq!(params.dtypes["x"], LogicalType::String);
        assert_eq!(params.dtypes["y"], LogicalType::Float);
    }

    #[test]
    fn apply_dtypes_never_narrows() {
        let mut params = PipeParameters::default();
        params.dtypes.insert("x".into(), LogicalType::String);

        let incoming = BTreeMap::from([("x".to_string(), LogicalType::Int)]);
        let changes = params.apply_dtypes(&incoming);

        // String already holds ints; no change recorded.
        assert!(changes.is_empty());
        assert_eq!(params.dtypes["x"], LogicalType::String);
    }

    #[test]
    fn document_round_trip() {
        let mut params = PipeParameters {
            columns: roles(Some("dt"), None, Some("id")),
            upsert: true,
            ..Default::default()
        };
        params.dtypes.insert("val".into(), LogicalType::numeric(20, 5));
        params
            .indices
            .insert("by_region".into(), vec!["region".into(), "dt".into()]);

        let doc = params.to_document().unwrap();
        let restored = PipeParameters::from_document(&doc).unwrap();
        assert_eq!(restored, params);
        assert_eq!(restored.dtypes["val"], LogicalType::numeric(20, 5));
    }

    #[test]
    fn static_flag_serde_name() {
        let doc = r#"{"static": true}"#;
        let params = PipeParameters::from_document(doc).unwrap();
        assert!(params.static_schema);
        assert!(params.null_indices, "null_indices defaults on");
    }

    #[test]
    fn target_table_name() {
        let pipe = Pipe::new(
            PipeKeys::new("plugin_weather", "temperature").with_location("oslo"),
            "sql_main",
        );
        assert_eq!(pipe.target_table(), "pipe_plugin_weather_temperature_oslo");
    }
}
