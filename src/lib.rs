#![deny(missing_docs)]

//! Core library for the Audit RAG document analysis server.

/// Fixed-question document analysis and ad-hoc query orchestration.
pub mod analysis;
/// Chat-completions client that answers questions over retrieved context.
pub mod answering;
/// HTTP routing and REST handlers.
pub mod api;
/// Lazily constructed collaborator handles.
pub mod components;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and the local hashed embedder.
pub mod embedding;
/// Upload filename validation and sanitization.
pub mod intake;
/// Structured logging and tracing setup.
pub mod logging;
/// Document extraction, chunking and in-memory retrieval.
pub mod processing;
/// Per-request temporary storage for uploads.
pub mod workspace;

#[cfg(test)]
mod testing;
