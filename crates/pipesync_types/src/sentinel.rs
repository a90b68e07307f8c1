//! NULL-replacement sentinels for join-key comparison.
//!
//! Two NULLs must compare equal when deciding whether an incoming row
//! matches an existing one, which is the opposite of SQL's ternary NULL
//! semantics. Both the in-memory diff and the generated `ON`/`WHERE`
//! clauses therefore substitute a per-type sentinel before comparing.
//!
//! The defaults are deliberately out-of-domain magic values. A deployment
//! whose real data could collide overrides them through the builder; the
//! policy is threaded everywhere a comparison is built, so the override is
//! a single choke point.

use crate::{Flavor, LogicalType};
use chrono::NaiveDateTime;

/// The per-type NULL replacement values used in join comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelPolicy {
    /// Substituted for NULL in integer and boolean join columns.
    /// Default: `-987654321`.
    pub int: i64,
    /// Substituted for NULL in float and numeric join columns.
    /// Default: `-987654321.0`.
    pub float: f64,
    /// Substituted for NULL in text-like join columns.
    /// Default: `"<PIPESYNC_NULL>"`.
    pub text: String,
    /// Substituted for NULL in temporal join columns.
    /// Default: `1900-01-01 00:00:00`.
    pub datetime: NaiveDateTime,
    /// Whether NULL join keys participate in matching at all.
    ///
    /// When false, comparisons keep SQL ternary semantics: NULL never
    /// equals anything, including another NULL, so NULL-keyed rows are
    /// always treated as unseen. Pipes declaring `null_indices: false`
    /// run with this disabled. Default: `true`.
    pub match_nulls: bool,
}

impl SentinelPolicy {
    /// Overrides the integer sentinel.
    pub fn with_int(mut self, value: i64) -> Self {
        self.int = value;
        self
    }

    /// Overrides the float sentinel.
    pub fn with_float(mut self, value: f64) -> Self {
        self.float = value;
        self
    }

    /// Overrides the text sentinel.
    pub fn with_text(mut self, value: impl Into<String>) -> Self {
        self.text = value.into();
        self
    }

    /// Overrides the datetime sentinel.
    pub fn with_datetime(mut self, value: NaiveDateTime) -> Self {
        self.datetime = value;
        self
    }

    /// Disables NULL matching: join comparisons fall back to SQL
    /// ternary semantics and no sentinel substitution happens.
    pub fn without_null_matching(mut self) -> Self {
        self.match_nulls = false;
        self
    }

    /// Renders the SQL literal substituted for NULL inside a
    /// `COALESCE(col, <literal>)` on a join column of the given type.
    pub fn literal_for(&self, dtype: &LogicalType, flavor: Flavor) -> String {
        match dtype {
            LogicalType::Int | LogicalType::Bool => self.int.to_string(),
            LogicalType::Float | LogicalType::Numeric { .. } => self.float.to_string(),
            LogicalType::Datetime | LogicalType::DatetimeTz => {
                let formatted = self.datetime.format("%Y-%m-%d %H:%M:%S");
                match flavor {
                    Flavor::Oracle => {
                        format!("TO_TIMESTAMP('{formatted}', 'YYYY-MM-DD HH24:MI:SS')")
                    }
                    _ => format!("'{formatted}'"),
                }
            }
            // Uuid, bytes, json, geometry, and text all join as text.
            _ => format!("'{}'", self.text.replace('\'', "''")),
        }
    }

    /// The token substituted for NULL when building in-memory join keys.
    pub fn key_token(&self, dtype: &LogicalType) -> String {
        match dtype {
            LogicalType::Int | LogicalType::Bool => self.int.to_string(),
            LogicalType::Float | LogicalType::Numeric { .. } => self.float.to_string(),
            LogicalType::Datetime | LogicalType::DatetimeTz => {
                self.datetime.format("%Y-%m-%d %H:%M:%S").to_string()
            }
            _ => self.text.clone(),
        }
    }
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        Self {
            int: -987_654_321,
            float: -987_654_321.0,
            text: "<PIPESYNC_NULL>".to_string(),
            datetime: chrono::NaiveDate::from_ymd_opt(1900, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            match_nulls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_literals() {
        let policy = SentinelPolicy::default();
        assert_eq!(
            policy.literal_for(&LogicalType::Int, Flavor::Postgres),
            "-987654321"
        );
        assert_eq!(
            policy.literal_for(&LogicalType::String, Flavor::Postgres),
            "'<PIPESYNC_NULL>'"
        );
        assert_eq!(
            policy.literal_for(&LogicalType::Datetime, Flavor::Postgres),
            "'1900-01-01 00:00:00'"
        );
    }

    #[test]
    fn oracle_datetime_literal_uses_to_timestamp() {
        let policy = SentinelPolicy::default();
        let literal = policy.literal_for(&LogicalType::Datetime, Flavor::Oracle);
        assert!(literal.starts_with("TO_TIMESTAMP("));
    }

    #[test]
    fn overrides_apply() {
        let policy = SentinelPolicy::default()
            .with_int(-1)
            .with_text("NONE");
        assert_eq!(policy.literal_for(&LogicalType::Int, Flavor::Sqlite), "-1");
        assert_eq!(policy.key_token(&LogicalType::Uuid), "NONE");
    }

    #[test]
    fn null_matching_defaults_on_and_can_be_disabled() {
        assert!(SentinelPolicy::default().match_nulls);
        let policy = SentinelPolicy::default().without_null_matching();
        assert!(!policy.match_nulls);
        // The sentinel values themselves are untouched.
        assert_eq!(policy.int, -987_654_321);
    }

    #[test]
    fn text_sentinel_is_escaped() {
        let policy = SentinelPolicy::default().with_text("it's null");
        assert_eq!(
            policy.literal_for(&LogicalType::String, Flavor::Postgres),
            "'it''s null'"
        );
    }
}
