//! Lazily constructed collaborator handles.
//!
//! [`Components`] owns the document processor and query answerer as a pair: either both are
//! ready or neither is. Construction goes through a [`ComponentFactory`], happens on first
//! need, and is retried on later requests after a failure, so the service can leave degraded
//! mode without a restart.

use crate::answering::{
    AnswerError, AnswererSettings, CredentialStatus, GroqAnswerer, QueryAnswerer,
    classify_credential,
};
use crate::processing::{
    DocumentError, DocumentProcessor, LocalDocumentProcessor, ProcessorSettings,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Reasons the collaborator pair could not be built.
#[derive(Debug, Error)]
pub enum InitError {
    /// The document processor failed to construct.
    #[error("Failed to initialize document processor: {0}")]
    Processor(#[from] DocumentError),
    /// The query answerer failed to construct.
    #[error("Failed to initialize query answerer: {0}")]
    Answerer(#[from] AnswerError),
    /// The construction task panicked or was cancelled.
    #[error("Component construction aborted: {0}")]
    Aborted(String),
}

/// Ready-to-use collaborator pair.
#[derive(Clone)]
pub struct ComponentHandles {
    /// Document-processing collaborator.
    pub processor: Arc<dyn DocumentProcessor>,
    /// Question-answering collaborator.
    pub answerer: Arc<dyn QueryAnswerer>,
}

/// Builds the collaborator pair on demand.
pub trait ComponentFactory: Send + Sync {
    /// Construct the document processor.
    fn build_processor(&self) -> Result<Arc<dyn DocumentProcessor>, InitError>;

    /// Construct the query answerer.
    fn build_answerer(&self) -> Result<Arc<dyn QueryAnswerer>, InitError>;

    /// Credential the answerer will use, checked for placeholder values after construction.
    fn credential(&self) -> Option<String>;
}

/// Factory producing [`LocalDocumentProcessor`] and [`GroqAnswerer`].
pub struct DefaultComponentFactory {
    processor: ProcessorSettings,
    answerer: AnswererSettings,
}

impl DefaultComponentFactory {
    /// Capture the settings both collaborators are built from.
    pub fn new(processor: ProcessorSettings, answerer: AnswererSettings) -> Self {
        Self {
            processor,
            answerer,
        }
    }
}

impl ComponentFactory for DefaultComponentFactory {
    fn build_processor(&self) -> Result<Arc<dyn DocumentProcessor>, InitError> {
        Ok(Arc::new(LocalDocumentProcessor::new(&self.processor)?))
    }

    fn build_answerer(&self) -> Result<Arc<dyn QueryAnswerer>, InitError> {
        Ok(Arc::new(GroqAnswerer::new(&self.answerer)?))
    }

    fn credential(&self) -> Option<String> {
        self.answerer.api_key.clone()
    }
}

/// Process-wide holder of the collaborator pair.
///
/// Readers take a read lock and never wait behind a slow construction. Construction itself is
/// serialized by `init_lock`, so concurrent cold-start requests build the pair once.
pub struct Components {
    factory: Arc<dyn ComponentFactory>,
    handles: RwLock<Option<ComponentHandles>>,
    init_lock: Mutex<()>,
}

impl Components {
    /// Wrap a factory; nothing is constructed until [`Components::ensure_ready`] runs.
    pub fn new(factory: impl ComponentFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            handles: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    /// Whether both handles are currently ready. Never triggers construction.
    pub async fn is_ready(&self) -> bool {
        self.handles.read().await.is_some()
    }

    /// Make sure both handles exist, constructing them if needed. Returns `false` in degraded
    /// mode; the failure has already been logged.
    pub async fn ensure_ready(&self) -> bool {
        self.acquire().await.is_some()
    }

    /// Return the ready pair, constructing it first if necessary.
    pub async fn acquire(&self) -> Option<ComponentHandles> {
        if let Some(handles) = self.handles.read().await.clone() {
            return Some(handles);
        }

        let _init = self.init_lock.lock().await;
        // Another request may have finished construction while we waited.
        if let Some(handles) = self.handles.read().await.clone() {
            return Some(handles);
        }

        // Tokenizer loading and client setup are blocking work.
        let factory = self.factory.clone();
        let built = tokio::task::spawn_blocking(move || construct(factory.as_ref()))
            .await
            .unwrap_or_else(|join| Err(InitError::Aborted(join.to_string())));

        match built {
            Ok(handles) => {
                *self.handles.write().await = Some(handles.clone());
                tracing::info!("RAG components initialized");
                Some(handles)
            }
            Err(error) => {
                tracing::error!(
                    error = %error,
                    "RAG components unavailable; running in degraded mode"
                );
                None
            }
        }
    }
}

fn construct(factory: &dyn ComponentFactory) -> Result<ComponentHandles, InitError> {
    tracing::info!("Initializing RAG components");
    let processor = factory.build_processor()?;
    tracing::debug!("Document processor initialized");
    let answerer = factory.build_answerer()?;
    tracing::debug!("Query answerer initialized");

    match classify_credential(factory.credential().as_deref()) {
        CredentialStatus::Configured => {
            tracing::info!("Answering API key found; full functionality available");
        }
        status => {
            tracing::warn!(
                ?status,
                "Answering API key not properly set; answers will fail until GROQ_API_KEY is configured"
            );
        }
    }

    Ok(ComponentHandles {
        processor,
        answerer,
    })
}
