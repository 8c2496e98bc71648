//! Embedding index for text datasets.
//!
//! Documents are split into paragraph chunks (merged up to a soft limit,
//! oversized paragraphs split at sentence boundaries). Every chunk is
//! embedded once at load time; a search embeds the query and ranks chunks by
//! cosine similarity.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::embedding::{cosine_similarity, embed_blocking, Embedder};
use super::{TextChunk, TextSearch};
use crate::error::StoreError;

/// Chunks grow by whole paragraphs until this many characters
const CHUNK_SOFT_LIMIT: usize = 800;
/// No chunk exceeds this unless a single word does
const CHUNK_HARD_LIMIT: usize = 1500;

struct IndexedChunk {
    content: String,
    vector: Vec<f32>,
}

pub struct TextIndex {
    embedder: Arc<dyn Embedder>,
    chunks: Vec<IndexedChunk>,
}

impl TextIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk and embed a document. Returns the number of chunks added.
    pub async fn add_document(&mut self, text: &str) -> Result<usize, StoreError> {
        let contents = chunk_text(text);
        if contents.is_empty() {
            return Ok(0);
        }
        let vectors = embed_blocking(Arc::clone(&self.embedder), contents.clone()).await?;
        let added = contents.len();
        self.chunks.extend(
            contents
                .into_iter()
                .zip(vectors)
                .map(|(content, vector)| IndexedChunk { content, vector }),
        );
        Ok(added)
    }

    /// Index every file in `paths`.
    pub async fn from_files<P: AsRef<Path>>(
        embedder: Arc<dyn Embedder>,
        paths: &[P],
    ) -> Result<Self, StoreError> {
        let mut index = Self::new(embedder);
        for path in paths {
            let text = tokio::fs::read_to_string(path.as_ref()).await?;
            let added = index.add_document(&text).await?;
            debug!("[TextIndex] {} -> {} chunks", path.as_ref().display(), added);
        }
        info!("[TextIndex] Embedded {} chunks", index.len());
        Ok(index)
    }

    /// The `k` chunks nearest to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, StoreError> {
        if k == 0 || query.trim().is_empty() || self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = embed_blocking(Arc::clone(&self.embedder), vec![query.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        let mut scored: Vec<TextChunk> = self
            .chunks
            .iter()
            .map(|chunk| TextChunk {
                content: chunk.content.clone(),
                score: cosine_similarity(&query_vector, &chunk.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl TextSearch for TextIndex {
    async fn knn_search(&self, query: &str, k: usize) -> Result<Vec<TextChunk>, StoreError> {
        self.search(query, k).await
    }
}

/// Split text into chunks along blank-line paragraph breaks.
fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > CHUNK_HARD_LIMIT {
            flush(&mut current, &mut chunks);
            split_oversized(paragraph, &mut chunks);
            continue;
        }

        if !current.is_empty() && current.chars().count() + paragraph_len + 2 > CHUNK_SOFT_LIMIT {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    current.clear();
}

fn split_oversized(text: &str, chunks: &mut Vec<String>) {
    let mut current = String::new();
    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if !current.is_empty() && current.chars().count() + sentence_len + 1 > CHUNK_HARD_LIMIT {
            flush(&mut current, chunks);
        }
        if sentence_len > CHUNK_HARD_LIMIT {
            flush(&mut current, chunks);
            split_words(&sentence, chunks);
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }
    flush(&mut current, chunks);
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = match c {
            '.' | '!' | '?' => chars.peek().map_or(true, |next| next.is_whitespace()),
            '\n' => true,
            _ => false,
        };
        if boundary {
            if !current.trim().is_empty() {
                sentences.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

fn split_words(text: &str, chunks: &mut Vec<String>) {
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > CHUNK_HARD_LIMIT
        {
            flush(&mut current, chunks);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    flush(&mut current, chunks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ConceptEmbedder;

    #[tokio::test]
    async fn test_search_matches_meaning_not_words() {
        let embedder = Arc::new(ConceptEmbedder::new());
        let mut index = TextIndex::new(embedder.clone());
        let filler = "x".repeat(CHUNK_SOFT_LIMIT);
        let added = index
            .add_document(&format!(
                "Solar panels convert sunlight into electricity.\n\n{}\n\nEmployee vacation rules are listed here.",
                filler
            ))
            .await
            .unwrap();
        assert_eq!(added, 3);
        // one batch for the whole document
        assert_eq!(embedder.batches(), vec![3]);

        let hits = index.search("staff leave policy", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Employee vacation rules are listed here.");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_degenerate_searches_skip_the_model() {
        let embedder = Arc::new(ConceptEmbedder::new());
        let empty = TextIndex::new(embedder.clone());
        assert!(empty.search("vacation", 5).await.unwrap().is_empty());

        let mut index = TextIndex::new(embedder.clone());
        index.add_document("alpha beta gamma").await.unwrap();
        assert!(index.search("", 5).await.unwrap().is_empty());
        assert!(index.search("alpha", 0).await.unwrap().is_empty());
        assert_eq!(embedder.batches(), vec![1]);
    }

    #[test]
    fn test_small_paragraphs_are_merged() {
        let chunks = chunk_text("one\n\ntwo\n\n\n\nthree");
        assert_eq!(chunks, vec!["one\n\ntwo\n\nthree"]);
    }

    #[test]
    fn test_oversized_paragraph_respects_hard_limit() {
        let sentence = format!("{}. ", "word ".repeat(40).trim());
        let paragraph = sentence.repeat(20);
        let chunks = chunk_text(&paragraph);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_HARD_LIMIT));
    }

    #[tokio::test]
    async fn test_from_files_indexes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, "Wind turbines spin.").await.unwrap();
        tokio::fs::write(&b, "Holiday policy for workers.").await.unwrap();

        let index = TextIndex::from_files(Arc::new(ConceptEmbedder::new()), &[a, b])
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        let hits = index.knn_search("employee leave", 1).await.unwrap();
        assert_eq!(hits[0].content, "Holiday policy for workers.");
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let mut index = TextIndex::new(Arc::new(ConceptEmbedder::failing()));
        assert!(matches!(
            index.add_document("Some text").await,
            Err(StoreError::Embedding(_))
        ));
        assert!(index.is_empty());
    }
}
