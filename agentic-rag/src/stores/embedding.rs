//! Sentence embeddings for text retrieval.
//!
//! `FastEmbedder` runs all-MiniLM-L6-v2 (384 dimensions) locally through
//! fastembed. The model is loaded on first use, so wiring a deployment with
//! no text datasets never downloads it. Embedding is CPU-bound; async
//! callers go through `embed_blocking`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::error::StoreError;

/// Turns texts into vectors. One vector per input, same order.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError>;
}

pub struct FastEmbedder {
    cache_dir: PathBuf,
    model: Mutex<Option<Arc<TextEmbedding>>>,
}

impl FastEmbedder {
    /// `cache_dir` holds the downloaded model files.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            model: Mutex::new(None),
        }
    }

    fn model(&self) -> Result<Arc<TextEmbedding>, StoreError> {
        let mut slot = self
            .model
            .lock()
            .map_err(|_| StoreError::Embedding("embedding model lock poisoned".to_string()))?;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        info!(
            "[Embedding] Loading all-MiniLM-L6-v2 (cache: {})",
            self.cache_dir.display()
        );
        let mut options = InitOptions::default();
        options.model_name = EmbeddingModel::AllMiniLML6V2;
        options.cache_dir = self.cache_dir.clone();
        options.show_download_progress = false;
        let model = TextEmbedding::try_new(options)
            .map_err(|e| StoreError::Embedding(format!("failed to load model: {}", e)))?;

        let model = Arc::new(model);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model()?
            .embed(texts, None)
            .map_err(|e| StoreError::Embedding(e.to_string()))
    }
}

/// Run `embedder` on a blocking thread.
pub async fn embed_blocking(
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, StoreError> {
    let expected = texts.len();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed(texts))
        .await
        .map_err(|e| StoreError::Embedding(format!("embedding task failed: {}", e)))??;
    if vectors.len() != expected {
        return Err(StoreError::Embedding(format!(
            "expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
