//! Query half of lamp: configuration, retrieval, reranking, prompt assembly,
//! and the [`RagService`] that turns a question into a cited [`Answer`].

pub mod citation;
pub mod config;
pub mod error;
pub mod prompt;
pub mod reranker;
pub mod retriever;
pub mod service;
pub mod time;
pub mod types;

pub use error::RagError;
pub use reranker::Reranker;
pub use retriever::Retriever;
pub use service::{RagService, RetrievalSettings};
pub use types::{Answer, RetrievedCandidate};
