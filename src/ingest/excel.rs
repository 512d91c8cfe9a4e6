use calamine::{Data, Reader, open_workbook_auto};
use duckdb::Connection;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::csv::CsvIngestor;
use crate::ingest::{FileIngestor, IngestError};

/// Spreadsheet loader. Only the first worksheet is read; it is staged as a
/// CSV next to the upload and then loaded like any delimited file.
pub struct ExcelIngestor {
    csv_ingestor: CsvIngestor,
}

impl ExcelIngestor {
    pub fn new() -> Self {
        Self {
            csv_ingestor: CsvIngestor::new(),
        }
    }

    fn stage_first_sheet(&self, path: &Path, staging: &Path) -> Result<(), IngestError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| IngestError::Conversion(format!("cannot open workbook: {e}")))?;

        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::Conversion("workbook has no worksheets".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| IngestError::Conversion(format!("cannot read worksheet '{sheet}': {e}")))?;
        if range.is_empty() {
            return Err(IngestError::Conversion(format!("worksheet '{sheet}' is empty")));
        }

        let mut writer = csv::Writer::from_path(staging)
            .map_err(|e| IngestError::Conversion(e.to_string()))?;
        for row in range.rows() {
            writer
                .write_record(row.iter().map(cell_text))
                .map_err(|e| IngestError::Conversion(e.to_string()))?;
        }
        writer.flush()?;

        tracing::debug!("Staged worksheet '{}' ({} rows) at {}", sheet, range.height(), staging.display());
        Ok(())
    }
}

impl Default for ExcelIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIngestor for ExcelIngestor {
    fn ingest(&self, path: &Path, conn: &Connection, table_name: &str) -> Result<(), IngestError> {
        tracing::info!("Loading spreadsheet {} into '{}'", path.display(), table_name);

        let staging = staging_path(path);
        let result = self
            .stage_first_sheet(path, &staging)
            .and_then(|_| self.csv_ingestor.ingest(&staging, conn, table_name));

        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged sheet {}: {}", staging.display(), e);
            }
        }
        result
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sheet.csv");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("north".to_string())), "north");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }

    #[test]
    fn test_unreadable_workbook_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, b"definitely not a zip archive").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let err = ExcelIngestor::new().ingest(&path, &conn, "data").unwrap_err();

        assert!(matches!(err, IngestError::Conversion(_)));
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_first_sheet_becomes_data_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.xlsx");
        {
            let mut workbook = rust_xlsxwriter::Workbook::new();
            let sheet = workbook.add_worksheet();
            sheet.write_string(0, 0, "Region").unwrap();
            sheet.write_string(0, 1, "Unit Price").unwrap();
            sheet.write_string(1, 0, "North").unwrap();
            sheet.write_number(1, 1, 120).unwrap();
            sheet.write_string(2, 0, "South").unwrap();
            sheet.write_number(2, 1, 80.5).unwrap();
            workbook.add_worksheet().write_string(0, 0, "ignored").unwrap();
            workbook.save(&path).unwrap();
        }
        let dest = dir.path().join("store.duckdb");

        crate::ingest::IngestManager::new()
            .create_store(&path, "sales.xlsx", &dest)
            .unwrap();

        let schema = crate::db::schema_extractor::SchemaExtractor::new(3).describe(&dest).unwrap();
        assert_eq!(schema.table_count(), 1);
        let data = schema.table("data").unwrap();
        assert_eq!(data.row_count, 2);
        let names: Vec<&str> = data.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Region", "Unit_Price"]);

        let conn = Connection::open(&dest).unwrap();
        let total: f64 = conn
            .query_row("SELECT SUM(Unit_Price) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 200.5);
        assert!(!staging_path(&path).exists());
    }
}
