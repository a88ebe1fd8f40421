//! Exact nearest-neighbour index over unit-length vectors, persisted as a
//! small directory of files.
//!
//! Layout:
//! - `meta.json`: format version, embedding model id, dimension, vector count
//! - `vectors.bin`: little-endian `f32`, row-major, in insertion order
//! - `chunks.json`: the chunk behind each row, same order

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub const FORMAT_VERSION: u32 = 1;

const META_FILE: &str = "meta.json";
const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";

/// The text and provenance stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    pub source: String,
    pub start_offset: usize,
}

impl From<crate::document::Chunk> for IndexedChunk {
    fn from(chunk: crate::document::Chunk) -> Self {
        Self {
            text: chunk.text,
            source: chunk.source,
            start_offset: chunk.start_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    /// Cosine similarity; inputs are unit length so this is the dot product.
    pub score: f32,
    /// Insertion position of the row in the index.
    pub position: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    version: u32,
    embedding_model: String,
    dimension: usize,
    count: usize,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    embedding_model: String,
    dimension: usize,
    vectors: Vec<f32>,
    chunks: Vec<IndexedChunk>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(embedding_model: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Append rows. Either all rows are added or none are.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] if any vector has the wrong length.
    pub fn add(&mut self, entries: Vec<(Vec<f32>, IndexedChunk)>) -> Result<(), IndexError> {
        if let Some((bad, _)) = entries.iter().find(|(v, _)| v.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.vectors.reserve(entries.len() * self.dimension);
        self.chunks.reserve(entries.len());
        for (vector, chunk) in entries {
            self.vectors.extend_from_slice(&vector);
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// The `k` rows most similar to `query`, best first. Equal scores keep
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() || self.dimension == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>())
            .enumerate()
            .collect();

        let by_rank = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let chunk = &self.chunks[position];
                SearchHit {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    score,
                    position,
                }
            })
            .collect())
    }

    /// Write the index into `dir`, creating it if needed. Each file is written
    /// to a temporary name first and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;

        let meta = IndexMeta {
            version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension,
            count: self.len(),
        };
        let mut raw = Vec::with_capacity(self.vectors.len() * 4);
        for value in &self.vectors {
            raw.extend_from_slice(&value.to_le_bytes());
        }

        write_atomic(&dir.join(VECTORS_FILE), &raw)?;
        write_atomic(&dir.join(CHUNKS_FILE), &serde_json::to_vec(&self.chunks)?)?;
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;

        tracing::info!(
            path = %dir.display(),
            vectors = self.len(),
            dimension = self.dimension,
            "index saved"
        );
        Ok(())
    }

    /// Load an index written by [`FlatIndex::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if a file is missing or the files disagree with each other.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let meta: IndexMeta = serde_json::from_slice(&fs::read(dir.join(META_FILE))?)?;
        if meta.version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(meta.version));
        }

        let raw = fs::read(dir.join(VECTORS_FILE))?;
        let expected_bytes = meta.count * meta.dimension * 4;
        if raw.len() != expected_bytes {
            return Err(IndexError::Corrupt(format!(
                "{VECTORS_FILE} holds {} bytes, expected {expected_bytes}",
                raw.len()
            )));
        }
        let vectors: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let chunks: Vec<IndexedChunk> = serde_json::from_slice(&fs::read(dir.join(CHUNKS_FILE))?)?;
        if chunks.len() != meta.count {
            return Err(IndexError::Corrupt(format!(
                "{CHUNKS_FILE} holds {} chunks, expected {}",
                chunks.len(),
                meta.count
            )));
        }

        tracing::info!(
            path = %dir.display(),
            vectors = meta.count,
            dimension = meta.dimension,
            embedding_model = %meta.embedding_model,
            "index loaded"
        );
        Ok(Self {
            embedding_model: meta.embedding_model,
            dimension: meta.dimension,
            vectors,
            chunks,
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
