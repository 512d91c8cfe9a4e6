use duckdb::Connection;
use std::path::Path;

use crate::ingest::{FileIngestor, IngestError, create_table_from, sql_path};

/// Delimited text loader. Delimiter, quoting and column types are sniffed by
/// the engine; the first line is always the header.
pub struct CsvIngestor {
    sample_size: usize,
}

impl CsvIngestor {
    pub fn new() -> Self {
        Self { sample_size: 20_480 }
    }

    pub fn with_sample_size(sample_size: usize) -> Self {
        Self { sample_size }
    }

    fn relation(&self, path: &Path) -> String {
        format!(
            "read_csv({}, header = true, ignore_errors = true, sample_size = {})",
            sql_path(path),
            self.sample_size
        )
    }
}

impl Default for CsvIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIngestor for CsvIngestor {
    fn ingest(&self, path: &Path, conn: &Connection, table_name: &str) -> Result<(), IngestError> {
        tracing::info!("Loading delimited file {} into '{}'", path.display(), table_name);
        create_table_from(conn, table_name, &self.relation(path))
    }
}
