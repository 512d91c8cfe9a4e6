pub mod executor;
pub mod records;
pub mod schema;
pub mod schema_extractor;

use duckdb::{AccessMode, Config, Connection};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Engine(#[from] duckdb::Error),
    #[error("Failed to convert result set: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Failed to decode result rows: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opens a session store without write access. Every read path goes through
/// here so a validated query can never modify the store. External access is
/// off as well: file-reading table functions such as `read_text` cannot reach
/// anything outside the store.
pub fn open_read_only(path: &Path) -> Result<Connection, duckdb::Error> {
    let config = Config::default()
        .access_mode(AccessMode::ReadOnly)?
        .enable_external_access(false)?;
    Connection::open_with_flags(path, config)
}

/// Quotes an identifier for interpolation into engine SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal (file paths, table names passed to PRAGMAs).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("age"), "\"age\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("/tmp/o'brien.csv"), "'/tmp/o''brien.csv'");
    }

    #[test]
    fn test_read_only_connection_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.duckdb");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE data (id INTEGER); INSERT INTO data VALUES (1);")
                .unwrap();
        }

        let conn = open_read_only(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(conn.execute_batch("INSERT INTO data VALUES (2)").is_err());
    }

    #[test]
    fn test_read_only_connection_cannot_read_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.duckdb");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE data (id INTEGER)")
            .unwrap();
        let secret = dir.path().join(".env");
        std::fs::write(&secret, "OPENAI_API_KEY=sk-not-for-you\n").unwrap();

        let conn = open_read_only(&path).unwrap();
        let sql = format!("SELECT content FROM read_text({})", quote_literal(&secret.to_string_lossy()));
        assert!(conn.prepare(&sql).and_then(|mut stmt| stmt.query_row([], |row| row.get::<_, String>(0))).is_err());

        let csv = format!("SELECT * FROM read_csv({})", quote_literal(&secret.to_string_lossy()));
        assert!(conn.execute_batch(&csv).is_err());
    }
}
