use duckdb::Connection;
use std::path::Path;

use crate::ingest::{FileIngestor, IngestError, create_table_from, sql_path};

pub struct ParquetIngestor;

impl ParquetIngestor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ParquetIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIngestor for ParquetIngestor {
    fn ingest(&self, path: &Path, conn: &Connection, table_name: &str) -> Result<(), IngestError> {
        tracing::info!("Loading Parquet file {} into '{}'", path.display(), table_name);
        create_table_from(conn, table_name, &format!("read_parquet({})", sql_path(path)))
    }
}
