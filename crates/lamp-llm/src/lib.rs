//! Model backends for lamp: text embedding, causal generation, and relevance reranking.
//!
//! A single [`any::AnyProvider`] is built at startup and shared by the
//! ingestion pipeline and every query handler, so index vectors and query
//! vectors always come from the same embedding model.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle_provider;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod rerank;

pub use error::LlmError;
pub use provider::LlmProvider;
pub use rerank::RelevanceScorer;
