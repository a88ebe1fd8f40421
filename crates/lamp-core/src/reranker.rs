use std::sync::Arc;

use lamp_llm::RelevanceScorer;

use crate::error::RagError;
use crate::types::RetrievedCandidate;

/// Second-stage ranking, chosen once when the service is built.
#[derive(Debug, Clone, Default)]
pub enum Reranker {
    /// Keep the retriever's order and cut to size.
    #[default]
    None,
    /// Re-score every candidate against the query.
    Model(Arc<dyn RelevanceScorer>),
}

impl Reranker {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Reduce `candidates` to the best `k`.
    ///
    /// With a model, candidates are re-scored and sorted by the new score;
    /// equal scores keep retrieval order. Each returned candidate keeps its
    /// source and carries the new score.
    ///
    /// # Errors
    ///
    /// Returns an error if the scorer fails or returns the wrong number of scores.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RetrievedCandidate>,
        k: usize,
    ) -> Result<Vec<RetrievedCandidate>, RagError> {
        let scorer = match self {
            Self::None => {
                candidates.truncate(k);
                return Ok(candidates);
            }
            Self::Model(scorer) => Arc::clone(scorer),
        };
        if candidates.is_empty() || k == 0 {
            candidates.truncate(k);
            return Ok(candidates);
        }

        let query = query.to_owned();
        let passages: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = tokio::task::spawn_blocking(move || scorer.score(&query, &passages))
            .await?
            .map_err(RagError::Rerank)?;
        if scores.len() != candidates.len() {
            return Err(RagError::RerankCount {
                candidates: candidates.len(),
                scores: scores.len(),
            });
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.score = score;
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use lamp_llm::LlmError;
    use lamp_llm::mock::MockScorer;

    use super::*;

    fn candidates() -> Vec<RetrievedCandidate> {
        [
            ("glucose levels after fasting", "A", 0.9),
            ("insulin resistance in liver", "B", 0.8),
            ("insulin resistance and insulin signalling", "C", 0.7),
            ("unrelated text", "D", 0.6),
        ]
        .into_iter()
        .map(|(content, source, score)| RetrievedCandidate {
            content: content.into(),
            source: source.into(),
            score,
        })
        .collect()
    }

    #[tokio::test]
    async fn none_truncates_in_order() {
        let out = Reranker::None.rerank("q", candidates(), 2).await.unwrap();
        assert_eq!(out, candidates()[..2].to_vec());
    }

    #[tokio::test]
    async fn none_with_fewer_candidates_than_k() {
        let out = Reranker::None.rerank("q", candidates(), 10).await.unwrap();
        assert_eq!(out.len(), 4);
    }

    #[tokio::test]
    async fn model_reorders_and_rescores() {
        let reranker = Reranker::Model(Arc::new(MockScorer::default()));
        let out = reranker
            .rerank("insulin resistance", candidates(), 2)
            .await
            .unwrap();
        let sources: Vec<_> = out.iter().map(|c| c.source.as_str()).collect();
        // B and C both contain every query term; the tie keeps retrieval order.
        assert_eq!(sources, vec!["B", "C"]);
        assert!((out[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn scorer_failure_surfaces() {
        let reranker = Reranker::Model(Arc::new(MockScorer { fail: true }));
        let err = reranker.rerank("q", candidates(), 2).await.unwrap_err();
        assert!(matches!(err, RagError::Rerank(LlmError::Inference(_))));
    }

    #[tokio::test]
    async fn empty_input_skips_scoring() {
        let reranker = Reranker::Model(Arc::new(MockScorer { fail: true }));
        assert!(reranker.rerank("q", Vec::new(), 3).await.unwrap().is_empty());
    }
}
