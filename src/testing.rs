//! In-crate stubs for the collaborator seams.

use crate::answering::{AnswerError, QueryAnswerer};
use crate::components::{ComponentFactory, InitError};
use crate::processing::{ContextFragment, DocumentError, DocumentProcessor, ProcessReport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

/// Records processed paths and serves canned fragments once something was processed.
#[derive(Clone, Default)]
pub(crate) struct StubProcessor {
    pub(crate) fail_with: Option<String>,
    pub(crate) report_message: Option<String>,
    pub(crate) fragments: Vec<ContextFragment>,
    pub(crate) indexed: Arc<AtomicBool>,
    /// Each processed path and whether the file existed at that moment.
    pub(crate) processed: Arc<Mutex<Vec<(PathBuf, bool)>>>,
    pub(crate) searches: Arc<Mutex<Vec<String>>>,
    /// When set, `search` answers from whichever file was processed last.
    pub(crate) per_document: bool,
    pub(crate) current: Arc<Mutex<Option<String>>>,
}

impl StubProcessor {
    pub(crate) fn with_fragments(texts: &[&str]) -> Self {
        Self {
            fragments: texts
                .iter()
                .map(|text| ContextFragment::new(*text, "stub"))
                .collect(),
            ..Self::default()
        }
    }

    /// Serves one fragment sourced from the latest processed file, yielding between steps so
    /// concurrent callers interleave.
    pub(crate) fn per_document() -> Self {
        Self {
            per_document: true,
            ..Self::default()
        }
    }

    pub(crate) fn reporting(mut self, message: &str) -> Self {
        self.report_message = Some(message.to_string());
        self
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn processed_paths(&self) -> Vec<(PathBuf, bool)> {
        self.processed.lock().expect("processed lock").clone()
    }

    pub(crate) fn search_log(&self) -> Vec<String> {
        self.searches.lock().expect("search lock").clone()
    }
}

#[async_trait]
impl DocumentProcessor for StubProcessor {
    async fn process(&self, path: &Path) -> Result<ProcessReport, DocumentError> {
        self.processed
            .lock()
            .expect("processed lock")
            .push((path.to_path_buf(), path.exists()));
        if let Some(message) = &self.fail_with {
            return Err(DocumentError::Extraction {
                name: path.display().to_string(),
                reason: message.clone(),
            });
        }
        self.indexed.store(true, Ordering::SeqCst);
        if self.per_document {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            *self.current.lock().expect("current lock") = Some(name);
            tokio::task::yield_now().await;
        }
        Ok(ProcessReport {
            message: self
                .report_message
                .clone()
                .unwrap_or_else(|| "Processed 1 pages into 1 chunks".to_string()),
            pages: 1,
            chunks: self.fragments.len(),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<ContextFragment>, DocumentError> {
        self.searches
            .lock()
            .expect("search lock")
            .push(query.to_string());
        if self.per_document {
            tokio::task::yield_now().await;
            let current = self.current.lock().expect("current lock").clone();
            return Ok(current
                .map(|name| vec![ContextFragment::new(format!("contents of {name}"), name)])
                .unwrap_or_default());
        }
        if self.indexed.load(Ordering::SeqCst) {
            Ok(self.fragments.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Echoes the question and the number of fragments it was given, or with `citing` the
/// fragment sources joined by commas.
#[derive(Clone, Default)]
pub(crate) struct StubAnswerer {
    pub(crate) fail: bool,
    pub(crate) citing: bool,
}

impl StubAnswerer {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn citing() -> Self {
        Self {
            citing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl QueryAnswerer for StubAnswerer {
    async fn answer(&self, query: &str, context: &[ContextFragment]) -> Result<String, AnswerError> {
        if self.fail {
            return Err(AnswerError::MissingCredential);
        }
        if self.citing {
            tokio::task::yield_now().await;
            let sources: Vec<&str> = context
                .iter()
                .map(|fragment| fragment.source.as_str())
                .collect();
            return Ok(sources.join(","));
        }
        Ok(format!("{query} => {} fragments", context.len()))
    }
}

/// Factory handing out clones of the configured stubs.
pub(crate) struct StubFactory {
    pub(crate) processor: StubProcessor,
    pub(crate) answerer: StubAnswerer,
    pub(crate) builds: Arc<AtomicUsize>,
    pub(crate) fail_processor: Arc<AtomicBool>,
    pub(crate) fail_answerer: Arc<AtomicBool>,
    pub(crate) panic_processor: Arc<AtomicBool>,
    /// Thread the most recent processor build ran on.
    pub(crate) built_on: Arc<Mutex<Option<ThreadId>>>,
}

impl StubFactory {
    pub(crate) fn ready(processor: StubProcessor, answerer: StubAnswerer) -> Self {
        Self {
            processor,
            answerer,
            builds: Arc::new(AtomicUsize::new(0)),
            fail_processor: Arc::new(AtomicBool::new(false)),
            fail_answerer: Arc::new(AtomicBool::new(false)),
            panic_processor: Arc::new(AtomicBool::new(false)),
            built_on: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn broken() -> Self {
        let factory = Self::ready(StubProcessor::default(), StubAnswerer::default());
        factory.fail_processor.store(true, Ordering::SeqCst);
        factory
    }
}

impl ComponentFactory for StubFactory {
    fn build_processor(&self) -> Result<Arc<dyn DocumentProcessor>, InitError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        *self.built_on.lock().expect("thread lock") = Some(std::thread::current().id());
        if self.panic_processor.load(Ordering::SeqCst) {
            panic!("stub processor construction panicked");
        }
        if self.fail_processor.load(Ordering::SeqCst) {
            return Err(DocumentError::InvalidSettings("stub processor failure".into()).into());
        }
        Ok(Arc::new(self.processor.clone()))
    }

    fn build_answerer(&self) -> Result<Arc<dyn QueryAnswerer>, InitError> {
        if self.fail_answerer.load(Ordering::SeqCst) {
            return Err(AnswerError::Unavailable("stub answerer failure".into()).into());
        }
        Ok(Arc::new(self.answerer.clone()))
    }

    fn credential(&self) -> Option<String> {
        Some("gsk_stub".to_string())
    }
}
