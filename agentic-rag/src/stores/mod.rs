//! Read-only collaborators the orchestration layers consult.
//!
//! ## Key Types
//! - `DatasetCatalog` - Every dataset the controller may route to
//! - `TableCatalog` - Table files and their structure summaries
//! - `TextSearch` - Nearest-chunk search over text datasets
//! - `ExternalDatabases` - Schema introspection and read-only queries
//!
//! `manifest`, `text_index` and `sqlite` are the bundled implementations;
//! `embedding` supplies the vectors behind `text_index`.

pub mod embedding;
pub mod manifest;
pub mod sqlite;
pub mod table_summary;
pub mod text_index;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::protocol::DatasetDescriptor;

pub use embedding::{Embedder, FastEmbedder};
pub use manifest::Manifest;
pub use sqlite::SqliteDatabases;
pub use table_summary::summarize_csv;
pub use text_index::TextIndex;

// ============ Records ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,
    pub path: PathBuf,
    /// Structure summary shown to code agents (JSON text)
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referred_table: String,
    pub referred_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Table name -> schema, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbStructure {
    pub tables: BTreeMap<String, TableSchema>,
}

impl DbStructure {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Restrict to `names`, ignoring unknown tables.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> DbStructure {
        let tables = names
            .iter()
            .filter_map(|name| {
                self.tables
                    .get_key_value(name.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        DbStructure { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Pretty JSON list of `{table_name, fields}` as embedded in SQL prompts.
    pub fn table_and_fields_json(&self) -> String {
        let entries: Vec<Value> = self
            .tables
            .iter()
            .map(|(name, schema)| serde_json::json!({ "table_name": name, "fields": schema }))
            .collect();
        serde_json::to_string_pretty(&entries).unwrap_or_default()
    }
}

/// Result set of a read-only query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as CSV with a header row of column names.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row.iter().map(cell_text))?;
        }
        out.flush()?;
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============ Collaborators ============

#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    async fn list_all(&self) -> Result<Vec<DatasetDescriptor>, StoreError>;
}

#[async_trait]
pub trait TableCatalog: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Option<TableRecord>, StoreError>;
}

#[async_trait]
pub trait TextSearch: Send + Sync {
    async fn knn_search(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, StoreError>;
}

#[async_trait]
pub trait ExternalDatabases: Send + Sync {
    async fn structure(&self, db_name: &str) -> Result<DbStructure, StoreError>;

    async fn run_read_query(&self, db_name: &str, sql: &str) -> Result<QueryRows, StoreError>;
}
