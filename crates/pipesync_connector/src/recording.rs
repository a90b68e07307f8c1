//! A scripted [`SqlClient`] for tests and dry runs.

use crate::error::ConnectorResult;
use crate::traits::SqlClient;
use parking_lot::RwLock;
use pipesync_batch::Batch;
use pipesync_types::Flavor;
use std::collections::VecDeque;

/// Captures every statement and serves scripted query results.
///
/// `query` pops the next scripted batch (or returns an empty one), so a
/// test scripts results in the order the code under test will ask for
/// them. Also the backend of the CLI's `plan` command.
pub struct RecordingClient {
    flavor: Flavor,
    statements: RwLock<Vec<String>>,
    scripted: RwLock<VecDeque<Batch>>,
}

impl RecordingClient {
    /// Creates a recorder for one dialect.
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            statements: RwLock::new(Vec::new()),
            scripted: RwLock::new(VecDeque::new()),
        }
    }

    /// Queues a result for a future `query` call.
    pub fn script_result(&self, batch: Batch) {
        self.scripted.write().push_back(batch);
    }

    /// Every statement seen so far, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.read().clone()
    }

    /// Drops the recorded history.
    pub fn clear(&self) {
        self.statements.write().clear();
    }
}

impl SqlClient for RecordingClient {
    fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn execute(&self, sql: &str) -> ConnectorResult<u64> {
        self.statements.write().push(sql.to_string());
        Ok(0)
    }

    fn query(&self, sql: &str) -> ConnectorResult<Batch> {
        self.statements.write().push(sql.to_string());
        Ok(self.scripted.write().pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesync_batch::Cell;

    #[test]
    fn records_in_order_and_pops_scripted_results() {
        let client = RecordingClient::new(Flavor::Postgres);
        client.script_result(Batch::from_rows(&["n"], vec![vec![Cell::Int(1)]]).unwrap());

        client.execute("CREATE TABLE t (x BIGINT)").unwrap();
        let result = client.query("SELECT n FROM t").unwrap();
        assert_eq!(result.num_rows(), 1);

        // Unscripted queries come back empty rather than failing.
        assert!(client.query("SELECT n FROM t").unwrap().is_empty());
        assert_eq!(client.statements().len(), 3);
    }
}
