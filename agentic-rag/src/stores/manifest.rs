//! JSON manifest listing the datasets a deployment can answer from.
//!
//! ```json
//! {
//!   "text": [{"name": "...", "description": "...", "path": "notes.md"}],
//!   "tables": [{"name": "...", "description": "...", "path": "sales.csv", "summary": null}],
//!   "databases": [{"name": "...", "description": "...", "path": "shop.db"}]
//! }
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    summarize_csv, DatasetCatalog, Embedder, SqliteDatabases, TableCatalog, TableRecord, TextIndex,
};
use crate::error::StoreError;
use crate::protocol::{DataFormat, DatasetDescriptor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntry {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    /// Precomputed structure summary; derived from the CSV when absent
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub text: Vec<TextEntry>,
    #[serde(default)]
    pub tables: Vec<TableEntry>,
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
}

impl Manifest {
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut manifest: Manifest = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Invalid(format!("{}: {}", path.display(), e)))?;

        if let Some(base) = path.parent() {
            manifest.resolve_paths(base);
        }
        info!(
            "[Manifest] Loaded {} text, {} table and {} database entries from {}",
            manifest.text.len(),
            manifest.tables.len(),
            manifest.databases.len(),
            path.display()
        );
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.text.iter_mut().for_each(|e| resolve(&mut e.path));
        self.tables.iter_mut().for_each(|e| resolve(&mut e.path));
        self.databases.iter_mut().for_each(|e| resolve(&mut e.path));
    }

    /// Embed every text entry into one index.
    pub async fn text_index(&self, embedder: Arc<dyn Embedder>) -> Result<TextIndex, StoreError> {
        let paths: Vec<&Path> = self.text.iter().map(|e| e.path.as_path()).collect();
        TextIndex::from_files(embedder, &paths).await
    }

    pub fn databases(&self) -> SqliteDatabases {
        let mut databases = SqliteDatabases::new();
        for entry in &self.databases {
            databases.insert(entry.name.clone(), entry.path.clone());
        }
        databases
    }
}

#[async_trait]
impl DatasetCatalog for Manifest {
    async fn list_all(&self) -> Result<Vec<DatasetDescriptor>, StoreError> {
        let describe = |name: &str, description: &str, format| DatasetDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            format,
        };
        let datasets = self
            .text
            .iter()
            .map(|e| describe(&e.name, &e.description, DataFormat::Text))
            .chain(
                self.tables
                    .iter()
                    .map(|e| describe(&e.name, &e.description, DataFormat::Table)),
            )
            .chain(
                self.databases
                    .iter()
                    .map(|e| describe(&e.name, &e.description, DataFormat::ExternalDb)),
            )
            .collect();
        Ok(datasets)
    }
}

#[async_trait]
impl TableCatalog for Manifest {
    async fn fetch(&self, name: &str) -> Result<Option<TableRecord>, StoreError> {
        let Some(entry) = self.tables.iter().find(|e| e.name == name) else {
            return Ok(None);
        };

        let summary = match &entry.summary {
            Some(summary) => summary.clone(),
            None => {
                debug!("[Manifest] Summarizing {}", entry.path.display());
                let path = entry.path.clone();
                tokio::task::spawn_blocking(move || summarize_csv(&path))
                    .await
                    .map_err(|e| StoreError::Invalid(format!("summary task failed: {}", e)))??
            }
        };

        Ok(Some(TableRecord {
            name: entry.name.clone(),
            path: entry.path.clone(),
            summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ConceptEmbedder;

    async fn write_manifest(dir: &Path) -> PathBuf {
        tokio::fs::write(dir.join("sales.csv"), "region,amount\nnorth,10\nsouth,20\n")
            .await
            .unwrap();
        let manifest = r#"{
            "text": [{"name": "handbook", "description": "Employee handbook", "path": "handbook.md"}],
            "tables": [
                {"name": "sales", "description": "Quarterly sales", "path": "sales.csv"},
                {"name": "cached", "description": "Has summary", "path": "/data/x.csv", "summary": "{}"}
            ]
        }"#;
        let path = dir.join("manifest.json");
        tokio::fs::write(&path, manifest).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_lists_every_dataset_with_format() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&write_manifest(dir.path()).await).await.unwrap();

        let datasets = manifest.list_all().await.unwrap();
        let formats: Vec<DataFormat> = datasets.iter().map(|d| d.format).collect();
        assert_eq!(
            formats,
            vec![DataFormat::Text, DataFormat::Table, DataFormat::Table]
        );
        assert!(manifest.databases.is_empty());
        assert_eq!(manifest.text[0].path, dir.path().join("handbook.md"));
    }

    #[tokio::test]
    async fn test_fetch_summarizes_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&write_manifest(dir.path()).await).await.unwrap();

        let sales = manifest.fetch("sales").await.unwrap().unwrap();
        assert!(sales.summary.contains("\"total_rows\": 2"));

        let cached = manifest.fetch("cached").await.unwrap().unwrap();
        assert_eq!(cached.summary, "{}");
        assert_eq!(cached.path, PathBuf::from("/data/x.csv"));

        assert!(manifest.fetch("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_text_index_covers_text_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path()).await;
        tokio::fs::write(
            dir.path().join("handbook.md"),
            "Employee vacation rules.\n\nWind turbines on the roof.",
        )
        .await
        .unwrap();
        let manifest = Manifest::load(&path).await.unwrap();

        let index = manifest
            .text_index(Arc::new(ConceptEmbedder::new()))
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search("staff leave policy", 1).await.unwrap();
        assert!(hits[0].content.starts_with("Employee vacation rules."));
    }

    #[tokio::test]
    async fn test_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(StoreError::Invalid(_))
        ));
    }
}
