pub mod columns;
pub mod csv;
pub mod excel;
pub mod parquet;
pub mod sqlite;

use duckdb::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::{open_read_only, quote_ident};

/// Table every converted upload lands in.
pub const DEFAULT_TABLE: &str = "data";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file format: {0}")]
    FileFormat(String),
    #[error("File conversion failed: {0}")]
    Conversion(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<duckdb::Error> for IngestError {
    fn from(err: duckdb::Error) -> Self {
        IngestError::Conversion(err.to_string())
    }
}

/// Loads one source file into `table_name` on an open store connection.
pub trait FileIngestor: Send + Sync {
    fn ingest(&self, path: &Path, conn: &Connection, table_name: &str) -> Result<(), IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Spreadsheet,
    Parquet,
    Database,
}

impl FileKind {
    pub fn from_extension(extension: &str) -> Result<Self, IngestError> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Ok(FileKind::Delimited),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Ok(FileKind::Spreadsheet),
            "parquet" => Ok(FileKind::Parquet),
            "db" | "duckdb" => Ok(FileKind::Database),
            other => Err(IngestError::FileFormat(other.to_string())),
        }
    }
}

/// Lowercased extension of an uploaded filename. A name without a dot has no
/// extension and is rejected.
pub fn file_extension(filename: &str) -> Result<String, IngestError> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| IngestError::FileFormat(filename.to_string()))
}

/// Turns uploaded files into single-file stores.
pub struct IngestManager {
    csv_ingestor: csv::CsvIngestor,
    excel_ingestor: excel::ExcelIngestor,
    parquet_ingestor: parquet::ParquetIngestor,
    sqlite_importer: sqlite::SqliteImporter,
    table_name: String,
}

impl IngestManager {
    pub fn new() -> Self {
        Self {
            csv_ingestor: csv::CsvIngestor::new(),
            excel_ingestor: excel::ExcelIngestor::new(),
            parquet_ingestor: parquet::ParquetIngestor::new(),
            sqlite_importer: sqlite::SqliteImporter::new(),
            table_name: DEFAULT_TABLE.to_string(),
        }
    }

    /// Builds the store at `dest` from `source`, dispatching on the extension
    /// of `filename`. On any failure nothing is left at `dest`.
    pub fn create_store(&self, source: &Path, filename: &str, dest: &Path) -> Result<(), IngestError> {
        let kind = FileKind::from_extension(&file_extension(filename)?)?;

        let result = match kind {
            FileKind::Database => match sqlite::is_sqlite_file(source) {
                Ok(true) => self.import_sqlite(source, dest),
                Ok(false) => self.adopt_database(source, dest),
                Err(e) => Err(e),
            },
            _ => self.convert(kind, source, dest),
        };

        if let Err(e) = &result {
            tracing::warn!("Ingestion of '{}' failed: {}", filename, e);
            remove_store_files(dest);
        }
        result
    }

    fn convert(&self, kind: FileKind, source: &Path, dest: &Path) -> Result<(), IngestError> {
        let conn = Connection::open(dest)?;

        let ingestor: &dyn FileIngestor = match kind {
            FileKind::Delimited => &self.csv_ingestor,
            FileKind::Spreadsheet => &self.excel_ingestor,
            FileKind::Parquet => &self.parquet_ingestor,
            FileKind::Database => {
                return Err(IngestError::Conversion("database files are not converted".to_string()));
            }
        };
        ingestor.ingest(source, &conn, &self.table_name)?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table_name)),
            [],
            |row| row.get(0),
        )?;
        tracing::info!("Created table '{}' with {} rows in {}", self.table_name, count, dest.display());

        Ok(())
    }

    fn import_sqlite(&self, source: &Path, dest: &Path) -> Result<(), IngestError> {
        let mut conn = Connection::open(dest)?;
        let tables = self.sqlite_importer.import(source, &mut conn)?;
        tracing::info!("Imported {} SQLite tables into {}", tables, dest.display());
        Ok(())
    }

    // Engine-native database uploads are kept as-is once the engine accepts them
    fn adopt_database(&self, source: &Path, dest: &Path) -> Result<(), IngestError> {
        fs::copy(source, dest)?;

        let conn = open_read_only(dest)?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main'",
            [],
            |row| row.get(0),
        )?;
        tracing::info!("Adopted database upload with {} tables at {}", tables, dest.display());

        Ok(())
    }
}

impl Default for IngestManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates `table_name` from a relation expression such as
/// `read_csv('...')`, renaming every column to its sanitized form.
pub(crate) fn create_table_from(conn: &Connection, table_name: &str, relation: &str) -> Result<(), IngestError> {
    let raw_names = {
        let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {relation}"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<String>, _>>()?
    };
    if raw_names.is_empty() {
        return Err(IngestError::Conversion("source has no columns".to_string()));
    }

    let clean_names = columns::sanitize_column_names(&raw_names);
    let projection = raw_names
        .iter()
        .zip(&clean_names)
        .map(|(raw, clean)| format!("{} AS {}", quote_ident(raw), quote_ident(clean)))
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute_batch(&format!(
        "CREATE TABLE {} AS SELECT {} FROM {}",
        quote_ident(table_name),
        projection,
        relation
    ))?;
    Ok(())
}

pub(crate) fn sql_path(path: &Path) -> String {
    crate::db::quote_literal(&path.to_string_lossy())
}

/// Removes a store and its write-ahead log, ignoring files that are already gone.
pub fn remove_store_files(db_path: &Path) {
    for path in [db_path.to_path_buf(), wal_path(db_path)] {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

fn wal_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".wal");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema_extractor::SchemaExtractor;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(FileKind::from_extension("CSV").unwrap(), FileKind::Delimited);
        assert_eq!(FileKind::from_extension("txt").unwrap(), FileKind::Delimited);
        assert_eq!(FileKind::from_extension("xlsx").unwrap(), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_extension("db").unwrap(), FileKind::Database);
        assert!(matches!(FileKind::from_extension("pdf"), Err(IngestError::FileFormat(_))));
        assert!(matches!(file_extension("README"), Err(IngestError::FileFormat(_))));
        assert_eq!(file_extension("Report.Final.CSV").unwrap(), "csv");
    }

    #[test]
    fn test_csv_becomes_data_table() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(dir.path(), "people.csv", b"name,age\nAlice,30\nBob,25\n");
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "people.csv", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        let data = schema.table("data").unwrap();
        assert_eq!(data.row_count, 2);
        let names: Vec<&str> = data.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age"]);
    }

    #[test]
    fn test_column_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(
            dir.path(),
            "messy.csv",
            b" First Name ,Age (yrs)\nAlice,30\n",
        );
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "messy.csv", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        let names: Vec<String> = schema.tables[0].columns.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["First_Name", "Age_yrs"]);
    }

    #[test]
    fn test_tab_separated_text_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(dir.path(), "cities.txt", b"city\tpopulation\nOslo\t700000\nBergen\t285000\n");
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "cities.txt", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        assert_eq!(schema.total_rows(), 2);
        assert_eq!(schema.tables[0].columns.len(), 2);
    }

    #[test]
    fn test_database_upload_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload.db");
        {
            let conn = Connection::open(&source).unwrap();
            conn.execute_batch(
                "CREATE TABLE products (sku VARCHAR, price DOUBLE);
                 INSERT INTO products VALUES ('a-1', 2.5);",
            )
            .unwrap();
        }
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "shop.db", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        assert!(schema.table("products").is_some());
        assert!(schema.table("data").is_none());
    }

    #[test]
    fn test_sqlite_upload_is_copied_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload.db");
        {
            let conn = rusqlite::Connection::open(&source).unwrap();
            conn.execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
                 INSERT INTO people (name, age) VALUES ('Alice', 30), ('Bob', 25);
                 CREATE TABLE orders (person_id INTEGER, total REAL);
                 INSERT INTO orders VALUES (1, 12.5);",
            )
            .unwrap();
        }
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "people.db", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        assert_eq!(schema.table_count(), 2);
        let people = schema.table("people").unwrap();
        assert_eq!(people.row_count, 2);
        let columns: Vec<(&str, &str)> = people
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(columns, vec![("id", "BIGINT"), ("name", "VARCHAR"), ("age", "BIGINT")]);
        assert_eq!(schema.table("orders").unwrap().row_count, 1);
    }

    #[test]
    fn test_offset_timestamps_are_describable() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(
            dir.path(),
            "events.csv",
            b"event,at\nlogin,2024-01-01 10:00:00+02\nlogout,2024-01-01 11:30:00+02\n",
        );
        let dest = dir.path().join("store.duckdb");

        IngestManager::new().create_store(&source, "events.csv", &dest).unwrap();

        let schema = SchemaExtractor::new(3).describe(&dest).unwrap();
        let data = schema.table("data").unwrap();
        assert_eq!(data.row_count, 2);
        assert!(data.sample_data[0]["at"].as_str().unwrap().starts_with("2024-01-01T08:00:00"));
    }

    #[test]
    fn test_corrupt_database_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(dir.path(), "garbage.db", b"this is not a database file at all");
        let dest = dir.path().join("store.duckdb");

        let err = IngestManager::new().create_store(&source, "garbage.db", &dest).unwrap_err();
        assert!(matches!(err, IngestError::Conversion(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(dir.path(), "notes.pdf", b"%PDF-1.4");
        let dest = dir.path().join("store.duckdb");

        let err = IngestManager::new().create_store(&source, "notes.pdf", &dest).unwrap_err();
        assert!(matches!(err, IngestError::FileFormat(ext) if ext == "pdf"));
        assert!(!dest.exists());
    }
}
