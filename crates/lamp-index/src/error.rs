use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input directory not found: {0}")]
    MissingInput(PathBuf),

    #[error("directory walk failed: {0}")]
    Walk(#[from] ignore::Error),

    #[error("vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count mismatch: {chunks} chunks, {vectors} vectors")]
    EmbeddingCount { chunks: usize, vectors: usize },

    #[error("cannot build an index from an empty batch")]
    EmptyBatch,

    #[error("index already created; use extend")]
    AlreadyCreated,

    #[error("index not created yet; use create")]
    NotCreated,

    #[error("unsupported index format version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] lamp_llm::LlmError),
}
