//! Default document processor: extraction, chunking, embedding and in-memory retrieval.

use crate::embedding::{EmbeddingClient, HashedEmbeddingClient};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::chunking::TextChunker;
use super::extract::{display_name, extract_text};
use super::index::{IndexedDocument, VectorIndex, dedupe_chunks};
use super::types::{
    ContextFragment, DocumentError, DocumentProcessor, ProcessReport, ProcessorSettings,
};

/// Processes one uploaded document at a time and answers similarity searches against it.
///
/// Extraction and chunking run on tokio's blocking pool; the index lives in memory and is lost
/// on restart.
pub struct LocalDocumentProcessor {
    chunker: Arc<TextChunker>,
    embedding_client: Box<dyn EmbeddingClient>,
    index: VectorIndex,
    top_k: usize,
}

impl LocalDocumentProcessor {
    /// Build a processor, loading the tokenizer and validating settings.
    pub fn new(settings: &ProcessorSettings) -> Result<Self, DocumentError> {
        if settings.top_k == 0 {
            return Err(DocumentError::InvalidSettings(
                "search top_k must be greater than zero".to_string(),
            ));
        }
        let chunker = TextChunker::new(settings.chunk_size, settings.chunk_overlap)?;
        let embedding_client = HashedEmbeddingClient::new(settings.embedding_dimension)?;

        tracing::debug!(
            chunk_size = settings.chunk_size,
            overlap = settings.chunk_overlap,
            dimension = embedding_client.dimension(),
            top_k = settings.top_k,
            "Document processor ready"
        );
        Ok(Self::with_parts(
            chunker,
            Box::new(embedding_client),
            settings.top_k,
        ))
    }

    fn with_parts(
        chunker: TextChunker,
        embedding_client: Box<dyn EmbeddingClient>,
        top_k: usize,
    ) -> Self {
        Self {
            chunker: Arc::new(chunker),
            embedding_client,
            index: VectorIndex::new(),
            top_k,
        }
    }
}

#[async_trait]
impl DocumentProcessor for LocalDocumentProcessor {
    async fn process(&self, path: &Path) -> Result<ProcessReport, DocumentError> {
        let name = display_name(path);
        tracing::info!(document = %name, "Processing document");

        let chunker = self.chunker.clone();
        let owned_path = path.to_path_buf();
        let (pages, chunks) = tokio::task::spawn_blocking(move || {
            let extracted = extract_text(&owned_path)?;
            Ok::<_, DocumentError>((extracted.pages, chunker.chunk(&extracted.text)))
        })
        .await
        .map_err(|err| DocumentError::Task(err.to_string()))??;

        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared.is_empty() {
            return Err(DocumentError::EmptyDocument(name));
        }

        let texts = prepared.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;
        let chunk_count = prepared.len();
        let document_id = self
            .index
            .replace(IndexedDocument::new(name.clone(), prepared, vectors))
            .await;

        tracing::info!(
            document = %name,
            %document_id,
            pages,
            chunks = chunk_count,
            skipped_duplicates,
            "Document indexed"
        );
        Ok(ProcessReport {
            message: format!("Processed {pages} pages into {chunk_count} chunks from {name}"),
            pages,
            chunks: chunk_count,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<ContextFragment>, DocumentError> {
        if self.index.is_empty().await {
            tracing::debug!("Search requested before any document was indexed");
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let Some(vector) = vectors.pop() else {
            return Ok(Vec::new());
        };
        Ok(self.index.search(&vector, self.top_k).await)
    }
}
