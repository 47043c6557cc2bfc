//! Token-bounded semantic chunking.
//!
//! Chunks are produced with `semchunk-rs` using `cl100k_base` token counts from `tiktoken-rs`.
//! When an overlap is configured, every chunk after the first is prefixed with the last
//! `overlap` tokens of its predecessor so passages that straddle a boundary stay retrievable.
//! The semantic pass runs with a budget of `chunk_size - overlap` to leave room for that prefix.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

use super::types::ChunkingError;

const ENCODING: &str = "cl100k_base";

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;
type TailExtractor = Arc<dyn Fn(&str, usize) -> String + Send + Sync>;

/// Splits document text into overlapping, token-bounded chunks.
#[derive(Clone)]
pub(crate) struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    count_tokens: TokenCounter,
    tail: TailExtractor,
}

impl TextChunker {
    /// Build a chunker backed by the `cl100k_base` encoding.
    ///
    /// The overlap is clamped below `chunk_size` so each chunk keeps at least one fresh token.
    pub(crate) fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let encoding = load_encoding().map_err(|source| ChunkingError::Tokenizer {
            encoding: ENCODING,
            source,
        })?;
        let encoding = Arc::new(encoding);
        let counter_encoding = encoding.clone();

        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            count_tokens: Arc::new(move |segment: &str| {
                counter_encoding.encode_ordinary(segment).len()
            }),
            tail: Arc::new(move |text: &str, limit: usize| {
                let tokens = encoding.encode_ordinary(text);
                let start = tokens.len().saturating_sub(limit);
                // Cutting mid-character makes decode fail; skipping the overlap is fine then.
                encoding.decode(tokens[start..].to_vec()).unwrap_or_default()
            }),
        })
    }

    /// Chunker that counts whitespace-separated words as tokens.
    #[cfg(test)]
    pub(crate) fn whitespace(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            count_tokens: Arc::new(|segment: &str| segment.split_whitespace().count()),
            tail: Arc::new(|text: &str, limit: usize| {
                let words: Vec<&str> = text.split_whitespace().collect();
                words[words.len().saturating_sub(limit)..].join(" ")
            }),
        }
    }

    /// Number of tokens in `text` under this chunker's counter.
    #[cfg(test)]
    pub(crate) fn count_tokens(&self, text: &str) -> usize {
        (self.count_tokens)(text)
    }

    /// Split `text` into chunks. Whitespace-only input yields no chunks.
    pub(crate) fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let counter = self.count_tokens.clone();
        let chunker = Chunker::new(
            self.chunk_size - self.overlap,
            Box::new(move |segment: &str| counter(segment)),
        );
        let base_chunks = chunker.chunk(text);
        if self.overlap == 0 {
            return base_chunks;
        }

        let mut chunks = Vec::with_capacity(base_chunks.len());
        let mut previous: Option<&str> = None;
        for current in &base_chunks {
            let chunk = match previous {
                Some(prev) => {
                    let carried = (self.tail)(prev, self.overlap);
                    let carried = carried.trim();
                    if carried.is_empty() {
                        current.clone()
                    } else {
                        format!("{carried} {current}")
                    }
                }
                None => current.clone(),
            };
            chunks.push(chunk);
            previous = Some(current);
        }
        chunks
    }
}

fn load_encoding() -> Result<CoreBPE, TokenizerError> {
    cl100k_base()
}
