use lamp_index::IndexError;
use lamp_llm::LlmError;

/// Request-level failures of the question-answering pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("query embedding failed: {0}")]
    Embedding(#[source] LlmError),

    #[error("index search failed: {0}")]
    Search(#[from] IndexError),

    #[error("reranking failed: {0}")]
    Rerank(#[source] LlmError),

    #[error("reranker returned {scores} scores for {candidates} candidates")]
    RerankCount { candidates: usize, scores: usize },

    #[error("generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("index dimension {index} does not match embedding dimension {embedder}")]
    IncompatibleIndex { index: usize, embedder: usize },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
