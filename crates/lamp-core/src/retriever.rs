use std::sync::Arc;

use lamp_index::FlatIndex;
use lamp_llm::LlmProvider;

use crate::error::RagError;
use crate::types::RetrievedCandidate;

/// Embeds queries and searches the read-only index.
///
/// Cloning is cheap; all clones share one loaded index.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<FlatIndex>,
}

impl Retriever {
    #[must_use]
    pub fn new(index: Arc<FlatIndex>) -> Self {
        Self { index }
    }

    #[must_use]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or its vector does not
    /// fit the index.
    pub async fn retrieve<P: LlmProvider>(
        &self,
        provider: &P,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedCandidate>, RagError> {
        let vector = provider.embed(query).await.map_err(RagError::Embedding)?;
        let index = Arc::clone(&self.index);
        let hits = tokio::task::spawn_blocking(move || index.search(&vector, k)).await??;
        tracing::debug!(k, hits = hits.len(), "index searched");
        Ok(hits.into_iter().map(RetrievedCandidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use lamp_index::IndexedChunk;
    use lamp_llm::mock::MockProvider;

    use super::*;

    async fn index_of(provider: &MockProvider, docs: &[(&str, &str)]) -> FlatIndex {
        let mut index = FlatIndex::new("mock-embedder", lamp_llm::mock::DEFAULT_MOCK_DIMENSION);
        let mut entries = Vec::new();
        for (text, source) in docs {
            let vector = provider.embed(text).await.unwrap();
            entries.push((
                vector,
                IndexedChunk {
                    text: (*text).into(),
                    source: (*source).into(),
                    start_offset: 0,
                },
            ));
        }
        index.add(entries).unwrap();
        index
    }

    #[tokio::test]
    async fn nearest_chunk_comes_first() {
        let provider = MockProvider::default();
        let index = index_of(
            &provider,
            &[
                ("diabetes outcomes in open access cohorts", "A"),
                ("insulin resistance mechanisms in muscle", "B"),
            ],
        )
        .await;
        let retriever = Retriever::new(Arc::new(index));

        let hits = retriever
            .retrieve(&provider, "What affects insulin resistance?", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "B");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn embedding_failure_surfaces() {
        let provider = MockProvider::default();
        let index = index_of(&provider, &[("text", "A")]).await;
        let retriever = Retriever::new(Arc::new(index));
        let failing = MockProvider::default().with_failing_embeddings();

        let err = retriever.retrieve(&failing, "q", 1).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_search_error() {
        let provider = MockProvider::default();
        let index = index_of(&provider, &[("text", "A")]).await;
        let retriever = Retriever::new(Arc::new(index));
        let small = MockProvider::default().with_dimension(8);

        let err = retriever.retrieve(&small, "q", 1).await.unwrap_err();
        assert!(matches!(err, RagError::Search(_)));
    }
}
