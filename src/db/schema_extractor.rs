use duckdb::{Connection, Row};
use std::path::Path;
use thiserror::Error;

use crate::db::records::query_records;
use crate::db::schema::{ColumnInfo, SchemaDescription, TableInfo};
use crate::db::{DbError, open_read_only, quote_ident, quote_literal};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema: {0}")]
    Extraction(#[from] DbError),
}

impl From<duckdb::Error> for SchemaError {
    fn from(err: duckdb::Error) -> Self {
        SchemaError::Extraction(DbError::Engine(err))
    }
}

/// Describes every base table in a session store, with a few sample rows per
/// table for prompt grounding.
#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    sample_rows: usize,
}

impl SchemaExtractor {
    pub fn new(sample_rows: usize) -> Self {
        Self { sample_rows }
    }

    pub fn describe(&self, db_path: &Path) -> Result<SchemaDescription, SchemaError> {
        let conn = open_read_only(db_path)?;

        let table_names = list_tables(&conn)?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            tables.push(self.describe_table(&conn, &name)?);
        }

        tracing::debug!("Described {} tables in {}", tables.len(), db_path.display());
        Ok(SchemaDescription { tables })
    }

    fn describe_table(&self, conn: &Connection, name: &str) -> Result<TableInfo, SchemaError> {
        let columns = table_columns(conn, name)?;

        let row_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(name)),
            [],
            |row| row.get(0),
        )?;

        let sample_data = query_records(
            conn,
            &format!("SELECT * FROM {} LIMIT {}", quote_ident(name), self.sample_rows),
        )?
        .rows;

        Ok(TableInfo {
            name: name.to_string(),
            columns,
            row_count: row_count.max(0) as u64,
            sample_data,
        })
    }
}

fn list_tables(conn: &Connection) -> duckdb::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect()
}

fn table_columns(conn: &Connection, table: &str) -> duckdb::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_literal(table)))?;
    let columns = stmt.query_map([], |row| {
        Ok(ColumnInfo {
            name: row.get(1)?,
            data_type: row.get(2)?,
            not_null: pragma_flag(row, 3)?,
            primary_key: pragma_flag(row, 5)?,
        })
    })?;
    columns.collect()
}

// notnull/pk come back as BOOLEAN on current engines and as integers on older ones
fn pragma_flag(row: &Row<'_>, idx: usize) -> duckdb::Result<bool> {
    match row.get::<_, bool>(idx) {
        Ok(value) => Ok(value),
        Err(_) => row.get::<_, i32>(idx).map(|value| value != 0),
    }
}
