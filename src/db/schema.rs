use serde::{Deserialize, Serialize};

use crate::db::records::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColumnInfo {
    /// `age (BIGINT, NOT NULL)` style annotation used in prompts.
    pub fn describe(&self) -> String {
        let mut annotation = self.data_type.clone();
        if self.not_null {
            annotation.push_str(", NOT NULL");
        }
        if self.primary_key {
            annotation.push_str(", PRIMARY KEY");
        }
        format!("{} ({})", self.name, annotation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
    pub sample_data: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
}

impl SchemaDescription {
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|table| table.row_count).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|table| table.name == name)
    }
}
