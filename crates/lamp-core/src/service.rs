use std::sync::Arc;
use std::time::Instant;

use lamp_index::FlatIndex;
use lamp_llm::{LlmError, LlmProvider};

use crate::error::RagError;
use crate::prompt::PromptTemplate;
use crate::reranker::Reranker;
use crate::retriever::Retriever;
use crate::time::format_elapsed;
use crate::types::{Answer, RetrievedCandidate};

/// Text embedded to learn the provider's vector dimension at startup.
const DIMENSION_PROBE: &str = "dimension probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub num_retrieved_docs: usize,
    pub num_docs_final: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            num_retrieved_docs: 100,
            num_docs_final: 5,
        }
    }
}

/// Everything a query needs, built once at startup and shared by reference
/// across request handlers.
pub struct RagService<P> {
    provider: P,
    retriever: Retriever,
    reranker: Reranker,
    template: PromptTemplate,
    settings: RetrievalSettings,
}

impl<P: LlmProvider> RagService<P> {
    #[must_use]
    pub fn new(
        provider: P,
        index: Arc<FlatIndex>,
        reranker: Reranker,
        template: PromptTemplate,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            provider,
            retriever: Retriever::new(index),
            reranker,
            template,
            settings,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn index(&self) -> &FlatIndex {
        self.retriever.index()
    }

    #[must_use]
    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    /// Check that the loaded index was built with vectors this provider can
    /// be compared against.
    ///
    /// A different embedding model id is only logged: two model ids may share
    /// a vector space, two dimensions never do.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IncompatibleIndex`] on a dimension mismatch, or the
    /// embedding error if the provider cannot embed or the probe fails.
    pub async fn verify_index(&self) -> Result<(), RagError> {
        if !self.provider.supports_embeddings() {
            return Err(RagError::Embedding(LlmError::EmbedUnsupported {
                provider: self.provider.name().to_owned(),
            }));
        }
        let index = self.retriever.index();
        let probe = self
            .provider
            .embed(DIMENSION_PROBE)
            .await
            .map_err(RagError::Embedding)?;
        if probe.len() != index.dimension() {
            return Err(RagError::IncompatibleIndex {
                index: index.dimension(),
                embedder: probe.len(),
            });
        }
        if index.embedding_model() != self.provider.embedding_model() {
            tracing::warn!(
                index_model = index.embedding_model(),
                provider_model = self.provider.embedding_model(),
                "index was built with a different embedding model; similarity scores may be meaningless"
            );
        }
        Ok(())
    }

    /// Retrieve, then rerank or truncate, the context for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, search, or reranking fails.
    pub async fn retrieve_context(&self, query: &str) -> Result<Vec<RetrievedCandidate>, RagError> {
        let candidates = self
            .retriever
            .retrieve(&self.provider, query, self.settings.num_retrieved_docs)
            .await?;
        let retrieved = candidates.len();
        let selected = self
            .reranker
            .rerank(query, candidates, self.settings.num_docs_final)
            .await?;
        tracing::debug!(
            retrieved,
            selected = selected.len(),
            reranked = self.reranker.is_enabled(),
            "context selected"
        );
        Ok(selected)
    }

    /// Answer `query` from the indexed corpus.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyQuery`] for a blank query, otherwise the first
    /// failure of retrieval, reranking, or generation.
    pub async fn answer(&self, query: &str) -> Result<Answer, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let started = Instant::now();

        let references = self.retrieve_context(query).await?;
        let messages = self.template.assemble(query, &references);
        let answer = self
            .provider
            .chat(&messages)
            .await
            .map_err(RagError::Generation)?;

        tracing::info!(
            references = references.len(),
            answer_chars = answer.chars().count(),
            elapsed = %format_elapsed(started.elapsed()),
            "query answered"
        );
        Ok(Answer {
            query: query.to_owned(),
            answer,
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use lamp_index::IndexedChunk;
    use lamp_llm::mock::MockProvider;
    use lamp_llm::provider::Role;

    use super::*;

    async fn service(provider: MockProvider, settings: RetrievalSettings) -> RagService<MockProvider> {
        let texts = [
            ("open access diabetes outcomes in adults", "PMC1-a.json"),
            ("insulin resistance mechanisms in skeletal muscle", "PMC2-b.json"),
            ("statin therapy and cardiovascular risk", "PMC3-c.json"),
        ];
        let mut index = FlatIndex::new(provider.embedding_model(), lamp_llm::mock::DEFAULT_MOCK_DIMENSION);
        let mut entries = Vec::new();
        for (text, source) in texts {
            entries.push((
                provider.embed(text).await.unwrap(),
                IndexedChunk {
                    text: text.into(),
                    source: source.into(),
                    start_offset: 0,
                },
            ));
        }
        index.add(entries).unwrap();
        RagService::new(
            provider,
            Arc::new(index),
            Reranker::None,
            PromptTemplate::default(),
            settings,
        )
    }

    fn settings(retrieved: usize, final_: usize) -> RetrievalSettings {
        RetrievalSettings {
            num_retrieved_docs: retrieved,
            num_docs_final: final_,
        }
    }

    #[tokio::test]
    async fn answer_carries_generated_text_and_references() {
        let provider = MockProvider::with_responses(vec!["Document 1 explains it.".into()]);
        let svc = service(provider, settings(3, 1)).await;

        let answer = svc.answer("insulin resistance mechanisms").await.unwrap();
        assert_eq!(answer.query, "insulin resistance mechanisms");
        assert_eq!(answer.answer, "Document 1 explains it.");
        assert_eq!(answer.references.len(), 1);
        assert_eq!(answer.references[0].source, "PMC2-b.json");

        let sent = svc.provider().received();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0].role, Role::System);
        assert!(sent[0][1].content.contains("Document 1:::\ninsulin resistance"));
        assert!(sent[0][1].content.contains("insulin resistance mechanisms"));
    }

    #[tokio::test]
    async fn blank_query_rejected_before_any_model_call() {
        let svc = service(MockProvider::default(), RetrievalSettings::default()).await;
        assert!(matches!(svc.answer("  \n").await, Err(RagError::EmptyQuery)));
        assert!(svc.provider().received().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_request_error() {
        let svc = service(MockProvider::failing(), settings(2, 1)).await;
        assert!(matches!(
            svc.answer("statin").await,
            Err(RagError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn verify_index_checks_dimension() {
        let svc = service(MockProvider::default(), RetrievalSettings::default()).await;
        svc.verify_index().await.unwrap();

        let index = Arc::new(FlatIndex::new("mock-embedder", 3));
        let mismatched = RagService::new(
            MockProvider::default(),
            index,
            Reranker::None,
            PromptTemplate::default(),
            RetrievalSettings::default(),
        );
        assert!(matches!(
            mismatched.verify_index().await,
            Err(RagError::IncompatibleIndex { index: 3, .. })
        ));
    }

    #[tokio::test]
    async fn verify_index_refuses_provider_without_embeddings() {
        let svc = service(
            MockProvider::default().without_embeddings(),
            RetrievalSettings::default(),
        )
        .await;
        assert!(matches!(
            svc.verify_index().await,
            Err(RagError::Embedding(LlmError::EmbedUnsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn repeated_queries_are_deterministic() {
        let svc = service(MockProvider::default(), settings(3, 3)).await;
        let first = svc.retrieve_context("diabetes outcomes").await.unwrap();
        let second = svc.retrieve_context("diabetes outcomes").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].source, "PMC1-a.json");
    }
}
