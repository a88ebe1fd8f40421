/// Plain text extracted from one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    /// Path of the originating file, used for citations.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    /// Byte offset of `text` within the document text.
    pub start_offset: usize,
    pub chunk_index: usize,
}
