//! Full-document analysis and ad-hoc question answering on top of the lazily built components.

use crate::components::{ComponentHandles, Components};
use crate::processing::ContextFragment;
use async_trait::async_trait;
use serde::Serialize;
use serde::ser::Serializer;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Questions asked of every uploaded document, in response order.
pub const ANALYSIS_QUERIES: [&str; 3] = [
    "Summarize the key findings and important information from this document",
    "Identify any potential audit risks, compliance issues, or red flags",
    "What are the main financial metrics or data points mentioned?",
];

/// Guidance returned alongside [`AnalysisError::NotInitialized`].
pub const SETUP_MESSAGE: &str = "Please check your GROQ API key setup";

/// Actionable steps returned alongside [`AnalysisError::NotInitialized`].
pub const SETUP_INSTRUCTIONS: &str =
    "Get your free API key from https://console.groq.com/keys and update the .env file";

/// Message returned when an ad-hoc query finds no indexed context.
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents found. Please upload a document first.";

/// Failures surfaced by the orchestrator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// The collaborator pair could not be constructed.
    #[error("RAG model not properly initialized.")]
    NotInitialized,
    /// The document processor rejected the upload; carries its message.
    #[error("{0}")]
    ProcessingFailed(String),
    /// The request carried no usable query text.
    #[error("No query provided")]
    EmptyQuery,
    /// A search or answer call failed mid-request.
    #[error("{0}")]
    Unexpected(String),
}

/// Answers keyed by question, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult {
    entries: Vec<(String, String)>,
}

impl AnalysisResult {
    fn insert(&mut self, query: &str, answer: String) {
        self.entries.push((query.to_string(), answer));
    }

    #[cfg(test)]
    pub(crate) fn get(&self, query: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == query)
            .map(|(_, answer)| answer.as_str())
    }

    #[cfg(test)]
    pub(crate) fn queries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(key, value)| (key, value)))
    }
}

/// Outcome of a successful document analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentAnalysis {
    /// Processor's own success message.
    pub message: String,
    /// Sanitized name the upload was stored under.
    pub filename: String,
    /// Answers to [`ANALYSIS_QUERIES`].
    pub analysis: AnalysisResult,
}

/// Outcome of an ad-hoc query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Nothing has been indexed yet; not an error.
    NoDocuments,
    /// The answerer produced a response.
    Answered {
        /// Question as submitted.
        query: String,
        /// Answer text, verbatim.
        response: String,
    },
}

/// Operations the HTTP layer needs from the analysis service.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Whether the collaborator pair is ready, without attempting construction.
    async fn is_ready(&self) -> bool;

    /// Process the staged upload at `path` and answer the fixed questions about it.
    async fn analyze_document(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<DocumentAnalysis, AnalysisError>;

    /// Answer a single caller-supplied question. `None` means the request carried no query.
    async fn answer_query(&self, query: Option<&str>) -> Result<QueryOutcome, AnalysisError>;
}

/// Default [`AnalysisApi`] backed by [`Components`].
///
/// The processor indexes one document at a time, so a document analysis holds `indexing`
/// from `process` through its last answer.
pub struct AnalysisService {
    components: Arc<Components>,
    indexing: Mutex<()>,
}

impl AnalysisService {
    /// Wrap the shared component holder.
    pub fn new(components: Arc<Components>) -> Self {
        Self {
            components,
            indexing: Mutex::new(()),
        }
    }

    async fn handles(&self) -> Result<ComponentHandles, AnalysisError> {
        self.components
            .acquire()
            .await
            .ok_or(AnalysisError::NotInitialized)
    }
}

async fn retrieve(
    handles: &ComponentHandles,
    query: &str,
) -> Result<Vec<ContextFragment>, AnalysisError> {
    handles
        .processor
        .search(query)
        .await
        .map_err(|err| AnalysisError::Unexpected(err.to_string()))
}

async fn answer(
    handles: &ComponentHandles,
    query: &str,
    context: &[ContextFragment],
) -> Result<String, AnalysisError> {
    handles
        .answerer
        .answer(query, context)
        .await
        .map_err(|err| AnalysisError::Unexpected(err.to_string()))
}

#[async_trait]
impl AnalysisApi for AnalysisService {
    async fn is_ready(&self) -> bool {
        self.components.is_ready().await
    }

    async fn analyze_document(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<DocumentAnalysis, AnalysisError> {
        let handles = self.handles().await?;
        let _indexing = self.indexing.lock().await;

        let report = handles.processor.process(path).await.map_err(|err| {
            tracing::warn!(filename, error = %err, "Document processing failed");
            AnalysisError::ProcessingFailed(err.to_string())
        })?;

        let mut analysis = AnalysisResult::default();
        for (position, query) in ANALYSIS_QUERIES.iter().enumerate() {
            tracing::debug!(
                filename,
                query = position + 1,
                total = ANALYSIS_QUERIES.len(),
                "Running analysis query"
            );
            let context = retrieve(&handles, query).await?;
            analysis.insert(query, answer(&handles, query, &context).await?);
        }

        tracing::info!(filename, pages = report.pages, chunks = report.chunks, "Document analyzed");
        Ok(DocumentAnalysis {
            message: report.message,
            filename: filename.to_string(),
            analysis,
        })
    }

    async fn answer_query(&self, query: Option<&str>) -> Result<QueryOutcome, AnalysisError> {
        let handles = self.handles().await?;
        let query = query.ok_or(AnalysisError::EmptyQuery)?;

        let context = retrieve(&handles, query).await?;
        if context.is_empty() {
            tracing::info!("Query received before any document was processed");
            return Ok(QueryOutcome::NoDocuments);
        }
        Ok(QueryOutcome::Answered {
            query: query.to_string(),
            response: answer(&handles, query, &context).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubAnswerer, StubFactory, StubProcessor};

    fn service(processor: StubProcessor, answerer: StubAnswerer) -> AnalysisService {
        AnalysisService::new(Arc::new(Components::new(StubFactory::ready(
            processor, answerer,
        ))))
    }

    #[tokio::test]
    async fn analysis_answers_fixed_queries_in_order() {
        let processor = StubProcessor::with_fragments(&["Revenue 4.2M", "Costs 1.1M"]);
        let service = service(processor.clone(), StubAnswerer::default());

        let result = service
            .analyze_document(Path::new("/tmp/report.pdf"), "report.pdf")
            .await
            .expect("analysis");

        assert_eq!(result.filename, "report.pdf");
        assert_eq!(result.message, "Processed 1 pages into 1 chunks");
        assert_eq!(result.analysis.queries().collect::<Vec<_>>(), ANALYSIS_QUERIES);
        assert_eq!(
            result.analysis.get(ANALYSIS_QUERIES[1]),
            Some(format!("{} => 2 fragments", ANALYSIS_QUERIES[1]).as_str())
        );
        assert_eq!(processor.search_log(), ANALYSIS_QUERIES);
    }

    #[tokio::test]
    async fn processing_failure_runs_no_queries() {
        let processor = StubProcessor::failing("encrypted pdf");
        let service = service(processor.clone(), StubAnswerer::default());

        let error = service
            .analyze_document(Path::new("/tmp/locked.pdf"), "locked.pdf")
            .await
            .unwrap_err();

        assert_eq!(
            error,
            AnalysisError::ProcessingFailed(
                "Failed to extract text from /tmp/locked.pdf: encrypted pdf".into()
            )
        );
        assert!(processor.search_log().is_empty());
    }

    #[tokio::test]
    async fn answer_failure_during_analysis_is_unexpected() {
        let service = service(
            StubProcessor::with_fragments(&["x"]),
            StubAnswerer::failing(),
        );
        let error = service
            .analyze_document(Path::new("/tmp/a.txt"), "a.txt")
            .await
            .unwrap_err();
        assert_eq!(
            error,
            AnalysisError::Unexpected("Answering API key is not configured".into())
        );
    }

    #[tokio::test]
    async fn uninitialized_components_fail_both_operations() {
        let service = AnalysisService::new(Arc::new(Components::new(StubFactory::broken())));

        assert_eq!(
            service
                .analyze_document(Path::new("/tmp/a.txt"), "a.txt")
                .await
                .unwrap_err(),
            AnalysisError::NotInitialized
        );
        assert_eq!(
            service.answer_query(None).await.unwrap_err(),
            AnalysisError::NotInitialized
        );
        assert!(!service.is_ready().await);
    }

    #[tokio::test]
    async fn missing_query_is_rejected_after_readiness() {
        let service = service(StubProcessor::default(), StubAnswerer::default());
        assert_eq!(
            service.answer_query(None).await.unwrap_err(),
            AnalysisError::EmptyQuery
        );
        assert!(service.is_ready().await);
    }

    #[tokio::test]
    async fn query_without_documents_is_not_an_error() {
        let service = service(StubProcessor::with_fragments(&["x"]), StubAnswerer::default());
        let outcome = service
            .answer_query(Some("What is the total?"))
            .await
            .expect("outcome");
        assert_eq!(outcome, QueryOutcome::NoDocuments);
    }

    #[tokio::test]
    async fn query_after_processing_returns_answer_verbatim() {
        let service = service(StubProcessor::with_fragments(&["x"]), StubAnswerer::default());
        service
            .analyze_document(Path::new("/tmp/a.txt"), "a.txt")
            .await
            .expect("analysis");

        let outcome = service
            .answer_query(Some("What is the total?"))
            .await
            .expect("outcome");
        assert_eq!(
            outcome,
            QueryOutcome::Answered {
                query: "What is the total?".into(),
                response: "What is the total? => 1 fragments".into(),
            }
        );
    }

    #[tokio::test]
    async fn overlapping_analyses_only_see_their_own_document() {
        let service = service(StubProcessor::per_document(), StubAnswerer::citing());

        let (first, second) = tokio::join!(
            service.analyze_document(Path::new("/tmp/one/alpha.txt"), "alpha.txt"),
            service.analyze_document(Path::new("/tmp/two/beta.txt"), "beta.txt"),
        );

        for (result, own) in [(first, "alpha.txt"), (second, "beta.txt")] {
            let result = result.expect("analysis");
            assert_eq!(result.filename, own);
            for query in ANALYSIS_QUERIES {
                assert_eq!(result.analysis.get(query), Some(own), "{query}");
            }
        }
    }

    #[test]
    fn analysis_result_serializes_in_insertion_order() {
        let mut result = AnalysisResult::default();
        result.insert("zeta", "last letter".into());
        result.insert("alpha", "first letter".into());

        let body = serde_json::to_string(&result).expect("json");
        assert_eq!(body, r#"{"zeta":"last letter","alpha":"first letter"}"#);
    }
}
