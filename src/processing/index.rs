//! In-memory vector index over the most recently processed document.

use crate::embedding::cosine_similarity;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::ContextFragment;

/// Chunk text with associated hash ready for embedding.
#[derive(Debug, Clone)]
pub(crate) struct PreparedChunk {
    pub(crate) text: String,
    pub(crate) chunk_hash: String,
}

/// SHA-256 of the chunk text, hex encoded.
pub(crate) fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Drop blank and repeated chunks, keeping the first occurrence. Returns the survivors and the
/// number of duplicates skipped.
pub(crate) fn dedupe_chunks(chunks: Vec<String>) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let chunk_hash = compute_chunk_hash(&text);
        if seen.insert(chunk_hash.clone()) {
            prepared.push(PreparedChunk { text, chunk_hash });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

#[derive(Debug)]
pub(crate) struct IndexedChunk {
    pub(crate) text: String,
    pub(crate) chunk_hash: String,
    pub(crate) vector: Vec<f32>,
}

/// Everything indexed for one processed document.
#[derive(Debug)]
pub(crate) struct IndexedDocument {
    pub(crate) id: Uuid,
    pub(crate) source: String,
    pub(crate) chunks: Vec<IndexedChunk>,
}

impl IndexedDocument {
    pub(crate) fn new(source: String, chunks: Vec<PreparedChunk>, vectors: Vec<Vec<f32>>) -> Self {
        debug_assert_eq!(chunks.len(), vectors.len());
        Self {
            id: Uuid::new_v4(),
            source,
            chunks: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk {
                    text: chunk.text,
                    chunk_hash: chunk.chunk_hash,
                    vector,
                })
                .collect(),
        }
    }
}

/// Holds at most one document; a newly processed document replaces the previous one.
#[derive(Default)]
pub(crate) struct VectorIndex {
    current: RwLock<Option<IndexedDocument>>,
}

impl VectorIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Install `document` as the searchable document and return the id it was stored under.
    pub(crate) async fn replace(&self, document: IndexedDocument) -> Uuid {
        let id = document.id;
        let mut guard = self.current.write().await;
        if let Some(previous) = guard.as_ref() {
            tracing::debug!(
                previous = %previous.id,
                source = %previous.source,
                "Replacing indexed document"
            );
        }
        *guard = Some(document);
        id
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_none_or(|document| document.chunks.is_empty())
    }

    /// Rank every chunk against `query_vector` and return the best `limit`, highest score first.
    pub(crate) async fn search(&self, query_vector: &[f32], limit: usize) -> Vec<ContextFragment> {
        let guard = self.current.read().await;
        let Some(document) = guard.as_ref() else {
            return Vec::new();
        };

        let mut scored: Vec<(f32, &IndexedChunk)> = document
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(query_vector, &chunk.vector), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(limit)
            .map(|(score, chunk)| {
                tracing::trace!(chunk_hash = %chunk.chunk_hash, score, "Selected context chunk");
                ContextFragment {
                    text: chunk.text.clone(),
                    source: document.source.clone(),
                    score,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(texts: &[&str]) -> Vec<PreparedChunk> {
        dedupe_chunks(texts.iter().map(|t| t.to_string()).collect()).0
    }

    #[test]
    fn dedupe_skips_blank_and_repeated_chunks() {
        let (chunks, skipped) = dedupe_chunks(vec![
            "alpha".into(),
            "  ".into(),
            "beta".into(),
            "alpha".into(),
        ]);
        assert_eq!(skipped, 1);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
        assert_eq!(chunks[0].chunk_hash, compute_chunk_hash("alpha"));
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = VectorIndex::new();
        assert!(index.is_empty().await);
        assert!(index.search(&[1.0, 0.0], 3).await.is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_limits() {
        let index = VectorIndex::new();
        index
            .replace(IndexedDocument::new(
                "ledger.txt".into(),
                prepared(&["north", "east", "north-east"]),
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            ))
            .await;

        let hits = index.search(&[1.0, 0.1], 2).await;
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.source == "ledger.txt"));
    }

    #[tokio::test]
    async fn replace_discards_previous_document() {
        let index = VectorIndex::new();
        let first = index
            .replace(IndexedDocument::new(
                "old.txt".into(),
                prepared(&["old"]),
                vec![vec![1.0]],
            ))
            .await;
        let second = index
            .replace(IndexedDocument::new(
                "new.txt".into(),
                prepared(&["new"]),
                vec![vec![1.0]],
            ))
            .await;

        assert_ne!(first, second);
        let hits = index.search(&[1.0], 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "new.txt");
    }
}
