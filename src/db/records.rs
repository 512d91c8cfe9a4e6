use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use serde_json::{Map, Value};

use crate::db::DbError;

/// One result row as an ordered column → value object.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

/// Runs `sql` and materializes every row. Results come back from the engine as
/// Arrow batches and are serialized through the Arrow JSON writer, so column
/// order and engine types (dates, decimals, lists) follow Arrow's encoding.
pub fn query_records(conn: &Connection, sql: &str) -> Result<QueryRows, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let arrow_batches = stmt.query_arrow([])?;

    let schema = arrow_batches.get_schema();
    let columns = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let record_batches: Vec<RecordBatch> = arrow_batches.collect();
    let rows = batches_to_records(&record_batches)?;

    Ok(QueryRows { columns, rows })
}

pub fn batches_to_records(batches: &[RecordBatch]) -> Result<Vec<Record>, DbError> {
    if batches.iter().all(|batch| batch.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut buffer = Vec::new();
    {
        let mut writer = WriterBuilder::new()
            .with_explicit_nulls(true)
            .build::<_, JsonArray>(&mut buffer);
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }

    Ok(serde_json::from_slice(&buffer)?)
}
