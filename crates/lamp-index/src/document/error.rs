#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidChunkConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("no separators configured")]
    NoSeparators,

    #[error("invalid separator pattern: {0}")]
    Separator(#[from] regex::Error),

    #[error("unsupported input type: {0}")]
    UnsupportedInputType(String),
}
