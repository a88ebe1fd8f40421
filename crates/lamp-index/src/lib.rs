//! Offline half of lamp: turn a corpus of article files into a persisted
//! vector index.
//!
//! Files are discovered, loaded, chunked, and embedded one bounded group at a
//! time; an [`IndexBuilder`] owns the index exclusively until ingestion ends and
//! the finished [`FlatIndex`] is written to disk for the query service.

pub mod builder;
pub mod discover;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod store;

pub use builder::IndexBuilder;
pub use discover::discover_files;
pub use document::InputType;
pub use error::IndexError;
pub use pipeline::{IngestOutcome, IngestReport, IngestionPipeline};
pub use store::{FlatIndex, IndexedChunk, SearchHit};
