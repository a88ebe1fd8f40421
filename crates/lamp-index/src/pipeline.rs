use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use lamp_llm::{LlmError, LlmProvider};

use crate::builder::IndexBuilder;
use crate::document::{Chunk, Document, DocumentLoader, LoadOutcome, TextSplitter};
use crate::error::IndexError;
use crate::store::{FlatIndex, IndexedChunk};

/// Files loaded concurrently within one group.
pub const DEFAULT_LOAD_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_total: usize,
    pub groups_total: usize,
    pub groups_indexed: usize,
    pub groups_skipped: usize,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    /// Display paths of files that contributed no text, in input order.
    pub skipped_files: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// An index was built and written to the output directory.
    Indexed {
        index: FlatIndex,
        report: IngestReport,
    },
    /// No group yielded any text; nothing was written.
    NoIndex(IngestReport),
}

impl IngestOutcome {
    #[must_use]
    pub fn report(&self) -> &IngestReport {
        match self {
            Self::Indexed { report, .. } | Self::NoIndex(report) => report,
        }
    }
}

/// Loads, chunks, and embeds files one group at a time and grows the index.
///
/// Groups run strictly in sequence so at most one group's documents, chunks,
/// and vectors are held in memory. Loading inside a group is concurrent.
pub struct IngestionPipeline<'a, P> {
    provider: &'a P,
    loader: Box<dyn DocumentLoader>,
    splitter: TextSplitter,
    group_size: usize,
    load_concurrency: usize,
}

impl<'a, P: LlmProvider> IngestionPipeline<'a, P> {
    #[must_use]
    pub fn new(
        provider: &'a P,
        loader: Box<dyn DocumentLoader>,
        splitter: TextSplitter,
        group_size: usize,
    ) -> Self {
        Self {
            provider,
            loader,
            splitter,
            group_size: group_size.max(1),
            load_concurrency: DEFAULT_LOAD_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_load_concurrency(mut self, n: usize) -> Self {
        self.load_concurrency = n.max(1);
        self
    }

    /// Ingest `files` and, if any text was indexed, persist the index to `output`.
    ///
    /// Unreadable or malformed files and empty groups are skipped and reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot embed, embedding fails, or the
    /// index cannot be written.
    pub async fn run(&self, files: &[PathBuf], output: &Path) -> Result<IngestOutcome, IndexError> {
        if !self.provider.supports_embeddings() {
            return Err(IndexError::Embedding(LlmError::EmbedUnsupported {
                provider: self.provider.name().to_owned(),
            }));
        }
        let started = Instant::now();
        let groups_total = files.len().div_ceil(self.group_size);
        let mut report = IngestReport {
            files_total: files.len(),
            groups_total,
            ..IngestReport::default()
        };
        let mut builder = IndexBuilder::new(self.provider.embedding_model());

        tracing::info!(
            files = files.len(),
            groups = groups_total,
            group_size = self.group_size,
            chunk_size = self.splitter.chunk_size(),
            chunk_overlap = self.splitter.chunk_overlap(),
            "ingestion started"
        );

        for (i, group) in files.chunks(self.group_size).enumerate() {
            let group_no = i + 1;
            let (documents, skipped) = self.load_group(group).await;

            if !skipped.is_empty() {
                tracing::warn!(group = group_no, count = skipped.len(), files = ?skipped, "files skipped");
            }
            report.skipped_files.extend(skipped);

            let chunks: Vec<Chunk> = documents.iter().flat_map(|d| self.splitter.split(d)).collect();
            if chunks.is_empty() {
                tracing::warn!(group = group_no, "group produced no text; skipping");
                report.groups_skipped += 1;
                continue;
            }

            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(IndexError::EmbeddingCount {
                    chunks: chunks.len(),
                    vectors: vectors.len(),
                });
            }

            let chunk_count = chunks.len();
            let batch = vectors
                .into_iter()
                .zip(chunks.into_iter().map(IndexedChunk::from))
                .collect();
            builder.add_group(batch)?;

            report.groups_indexed += 1;
            report.documents_indexed += documents.len();
            report.chunks_indexed += chunk_count;
            tracing::info!(
                group = group_no,
                groups = groups_total,
                documents = documents.len(),
                chunks = chunk_count,
                "group indexed"
            );
        }

        report.elapsed = started.elapsed();
        match builder.finish() {
            Some(index) => {
                index.save(output)?;
                tracing::info!(
                    documents = report.documents_indexed,
                    chunks = report.chunks_indexed,
                    skipped = report.skipped_files.len(),
                    elapsed = ?report.elapsed,
                    "ingestion finished"
                );
                Ok(IngestOutcome::Indexed { index, report })
            }
            None => {
                tracing::warn!(
                    files = report.files_total,
                    skipped = report.skipped_files.len(),
                    "no documents could be indexed; no index written"
                );
                Ok(IngestOutcome::NoIndex(report))
            }
        }
    }

    async fn load_group(&self, group: &[PathBuf]) -> (Vec<Document>, Vec<String>) {
        let outcomes: Vec<LoadOutcome> = futures::stream::iter(group)
            .map(|path| self.loader.load(path))
            .buffered(self.load_concurrency)
            .collect()
            .await;

        let mut documents = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                LoadOutcome::Loaded(doc) => documents.push(doc),
                LoadOutcome::Skipped { file, .. } => skipped.push(file),
            }
        }
        (documents, skipped)
    }
}
