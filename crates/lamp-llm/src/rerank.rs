//! Relevance scoring models used to rerank retrieved passages.

use crate::error::LlmError;

/// A model that scores (query, passage) pairs; higher is more relevant.
///
/// Scoring is synchronous and potentially expensive, so callers run it on a
/// blocking thread.
pub trait RelevanceScorer: Send + Sync + std::fmt::Debug {
    /// Score every passage against `query`, returning one score per passage in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the model forward pass fails.
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, LlmError>;

    fn name(&self) -> &str;
}
