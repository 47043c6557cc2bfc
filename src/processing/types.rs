//! Core data types and error definitions for the document processor.

use crate::embedding::EmbeddingClientError;
use anyhow::Error as TokenizerError;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors produced while turning raw text into token-bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Settings asked for an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources could not be loaded.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: &'static str,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the document processor.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Processor settings are unusable.
    #[error("Invalid document processor settings: {0}")]
    InvalidSettings(String),
    /// The file extension has no extractor.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// The staged file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File we attempted to read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file was readable but its contents could not be parsed.
    #[error("Failed to extract text from {name}: {reason}")]
    Extraction {
        /// File name being parsed.
        name: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Parsing succeeded but yielded no text worth indexing.
    #[error("No extractable text found in {0}")]
    EmptyDocument(String),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding step failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The blocking extraction task panicked or was cancelled.
    #[error("Document processing task failed: {0}")]
    Task(String),
}

/// Tunables for [`crate::processing::LocalDocumentProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Token budget per chunk, overlap included.
    pub chunk_size: usize,
    /// Tokens carried over from the end of the previous chunk.
    pub chunk_overlap: usize,
    /// Dimensionality of the embedding vectors.
    pub embedding_dimension: usize,
    /// Fragments returned per search.
    pub top_k: usize,
}

/// Summary of a successful `process` call.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    /// Human-readable outcome, surfaced verbatim to HTTP callers.
    pub message: String,
    /// Pages (or page-equivalents) read from the document.
    pub pages: usize,
    /// Chunks stored in the index.
    pub chunks: usize,
}

/// One piece of retrieved context, best matches first.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextFragment {
    /// Chunk text.
    pub text: String,
    /// Name of the document the chunk came from.
    pub source: String,
    /// Similarity to the query, higher is closer.
    pub score: f32,
}

impl ContextFragment {
    /// Build a fragment with the given text and source and a neutral score.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            score: 0.0,
        }
    }
}

/// Document-processing collaborator consumed by the analysis orchestrator.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Extract, chunk and index the file at `path`.
    ///
    /// An `Err` means the document could not be processed; its message is shown to the caller.
    async fn process(&self, path: &Path) -> Result<ProcessReport, DocumentError>;

    /// Return context fragments for `query`, best first. Empty when nothing has been indexed.
    async fn search(&self, query: &str) -> Result<Vec<ContextFragment>, DocumentError>;
}
