//! Default document-processing collaborator: text extraction, chunking and in-memory retrieval.

mod chunking;
mod extract;
mod index;
mod service;
pub mod types;

pub use service::LocalDocumentProcessor;
pub use types::{
    ChunkingError, ContextFragment, DocumentError, DocumentProcessor, ProcessReport,
    ProcessorSettings,
};
