use duckdb::Connection;
use duckdb::types::Value as StoreValue;
use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection as SqliteConnection, OpenFlags};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::db::quote_ident;
use crate::ingest::IngestError;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Conversion(err.to_string())
    }
}

/// True when the file starts with the SQLite 3 magic header.
pub fn is_sqlite_file(path: &Path) -> Result<bool, IngestError> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_HEADER),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Column type picked from the values a SQLite column actually holds,
/// since SQLite does not enforce declared types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Real,
    Blob,
    Text,
}

impl ColumnKind {
    fn of(value: &SqliteValue) -> Option<Self> {
        match value {
            SqliteValue::Null => None,
            SqliteValue::Integer(_) => Some(ColumnKind::Integer),
            SqliteValue::Real(_) => Some(ColumnKind::Real),
            SqliteValue::Text(_) => Some(ColumnKind::Text),
            SqliteValue::Blob(_) => Some(ColumnKind::Blob),
        }
    }

    fn widen(self, other: Self) -> Self {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Real) | (Real, Integer) => Real,
            _ => Text,
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "BIGINT",
            ColumnKind::Real => "DOUBLE",
            ColumnKind::Blob => "BLOB",
            ColumnKind::Text => "VARCHAR",
        }
    }

    fn convert(self, value: SqliteValue) -> StoreValue {
        match (self, value) {
            (_, SqliteValue::Null) => StoreValue::Null,
            (ColumnKind::Integer, SqliteValue::Integer(i)) => StoreValue::BigInt(i),
            (ColumnKind::Real, SqliteValue::Integer(i)) => StoreValue::Double(i as f64),
            (ColumnKind::Real, SqliteValue::Real(f)) => StoreValue::Double(f),
            (ColumnKind::Blob, SqliteValue::Blob(b)) => StoreValue::Blob(b),
            (_, SqliteValue::Integer(i)) => StoreValue::Text(i.to_string()),
            (_, SqliteValue::Real(f)) => StoreValue::Text(f.to_string()),
            (_, SqliteValue::Text(s)) => StoreValue::Text(s),
            (_, SqliteValue::Blob(b)) => StoreValue::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// Copies every user table of a SQLite database into a store, keeping table
/// and column names.
pub struct SqliteImporter;

impl SqliteImporter {
    pub fn new() -> Self {
        Self
    }

    pub fn import(&self, path: &Path, conn: &mut Connection) -> Result<usize, IngestError> {
        tracing::info!("Importing SQLite database {}", path.display());

        let source = SqliteConnection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let tables = list_tables(&source)?;
        if tables.is_empty() {
            return Err(IngestError::Conversion("SQLite database has no tables".to_string()));
        }

        for table in &tables {
            let rows = copy_table(&source, conn, table)?;
            tracing::debug!("Copied SQLite table '{}' ({} rows)", table, rows);
        }
        Ok(tables.len())
    }
}

impl Default for SqliteImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn list_tables(source: &SqliteConnection) -> Result<Vec<String>, IngestError> {
    let mut stmt = source.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(names.collect::<Result<Vec<_>, _>>()?)
}

fn copy_table(source: &SqliteConnection, conn: &mut Connection, table: &str) -> Result<usize, IngestError> {
    let mut stmt = source.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|idx| row.get::<_, SqliteValue>(idx))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let kinds: Vec<ColumnKind> = (0..width)
        .map(|idx| {
            rows.iter()
                .filter_map(|row| ColumnKind::of(&row[idx]))
                .reduce(ColumnKind::widen)
                .unwrap_or(ColumnKind::Text)
        })
        .collect();

    let definitions = columns
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| format!("{} {}", quote_ident(name), kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; width].join(", ");

    let row_count = rows.len();
    let tx = conn.transaction()?;
    tx.execute_batch(&format!("CREATE TABLE {} ({})", quote_ident(table), definitions))?;
    {
        let mut insert = tx.prepare(&format!("INSERT INTO {} VALUES ({})", quote_ident(table), placeholders))?;
        for row in rows {
            let values: Vec<StoreValue> = row
                .into_iter()
                .zip(&kinds)
                .map(|(value, kind)| kind.convert(value))
                .collect();
            insert.execute(duckdb::params_from_iter(values))?;
        }
    }
    tx.commit()?;

    Ok(row_count)
}
