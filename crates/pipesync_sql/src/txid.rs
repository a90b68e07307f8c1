//! Per-attempt transaction ids for ephemeral table naming.

use std::fmt;
use uuid::Uuid;

/// A random id generated once per sync attempt.
///
/// Ephemeral table names embed it so concurrent workers targeting the
/// same table never collide. The rendered form is 8 hex characters to
/// stay inside Oracle's historical 30-character identifier limit even
/// with a prefix and a role suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The short hex form used inside table names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// An ephemeral table name for one role (`new`, `bt`, `patch`, ...).
    pub fn temp_table(&self, role: &str) -> String {
        format!("ps_tmp_{}_{role}", self.short())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_are_distinct_per_id() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a.temp_table("new"), b.temp_table("new"));
        assert_ne!(a.temp_table("new"), a.temp_table("bt"));
    }

    #[test]
    fn temp_names_fit_legacy_identifier_limits() {
        let id = TransactionId::new();
        assert!(id.temp_table("patch").len() <= 30);
    }
}
