use crate::db::schema::{SchemaDescription, TableInfo};

/// Sample rows shown per table; the rest of the extracted sample is not sent.
const PROMPT_SAMPLE_ROWS: usize = 2;

/// Builds the generation prompt: every table with its columns and row count,
/// a couple of sample rows, the question, and the output rules.
pub fn build_prompt(question: &str, schema: &SchemaDescription) -> String {
    let schema_text = schema
        .tables
        .iter()
        .map(describe_table)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an expert DuckDB SQL developer. Your task is to generate a precise SQL query based on the user's natural language question and the provided database schema.

DATABASE SCHEMA:
{schema_text}

NATURAL LANGUAGE QUESTION: {question}

REQUIREMENTS FOR SQL QUERY:
- Generate ONLY the DuckDB SQL query.
- DO NOT include any explanations, markdown formatting (like ```sql), or comments.
- Ensure the query uses valid DuckDB syntax.
- Match column names exactly as they appear in the schema.
- Use appropriate WHERE, GROUP BY, ORDER BY, JOIN clauses as needed.
- For aggregate functions (e.g., COUNT, SUM, AVG), always include a GROUP BY clause if grouping by other columns.
- Handle NULL values appropriately.
- Only generate SELECT statements. Do NOT generate INSERT, UPDATE, DELETE, CREATE, ALTER, or DROP statements.

SQL Query:"#
    )
}

fn describe_table(table: &TableInfo) -> String {
    let mut text = format!("Table '{}' with {} rows:", table.name, table.row_count);
    for column in &table.columns {
        text.push_str("\n- ");
        text.push_str(&column.describe());
    }

    let sample = &table.sample_data[..table.sample_data.len().min(PROMPT_SAMPLE_ROWS)];
    if !sample.is_empty() {
        if let Ok(rows) = serde_json::to_string_pretty(sample) {
            text.push_str(&format!("\n  Sample data (first {} rows):\n{}", sample.len(), rows));
        }
    }

    text
}
