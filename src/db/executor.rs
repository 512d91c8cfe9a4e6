use serde::Serialize;
use std::path::Path;

use crate::db::records::{QueryRows, Record, query_records};
use crate::db::{DbError, open_read_only};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub results: Vec<Record>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn from_rows(rows: QueryRows) -> Self {
        let row_count = rows.rows.len();
        Self {
            success: true,
            columns: rows.columns,
            results: rows.rows,
            row_count,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            ..Self::default()
        }
    }
}

/// Runs `sql` against the store at `db_path` over a read-only connection that
/// is closed before returning. Engine failures are reported in the result, not
/// raised.
pub fn execute(db_path: &Path, sql: &str) -> ExecutionResult {
    match run(db_path, sql) {
        Ok(rows) => {
            tracing::debug!("Query returned {} rows", rows.rows.len());
            ExecutionResult::from_rows(rows)
        }
        Err(err) => {
            tracing::warn!("Query execution failed: {}", err);
            ExecutionResult::failed(err.to_string())
        }
    }
}

fn run(db_path: &Path, sql: &str) -> Result<QueryRows, DbError> {
    let conn = open_read_only(db_path)?;
    query_records(&conn, sql)
}
