//! Deterministic in-process models for tests and offline runs.
//!
//! [`MockProvider`] embeds text as a hashed bag of words, so texts sharing
//! vocabulary land close together and retrieval behaves sensibly without any
//! model weights. [`MockScorer`] ranks passages by query-term overlap.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, l2_normalize};
use crate::rerank::RelevanceScorer;

pub const DEFAULT_MOCK_DIMENSION: usize = 256;

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Vec<Message>>>>,
    pub default_response: String,
    pub dimension: usize,
    pub model_id: String,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Reported by `supports_embeddings`; `embed` still works when cleared.
    pub embeddings: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            received: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            dimension: DEFAULT_MOCK_DIMENSION,
            model_id: "mock-embedder".into(),
            fail_chat: false,
            fail_embed: false,
            embeddings: true,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn without_embeddings(mut self) -> Self {
        self.embeddings = false;
        self
    }

    /// Every conversation passed to `chat`, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension.max(1)];
        let buckets = vector.len();
        for token in tokens(text) {
            vector[bucket(&token, buckets)] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if self.fail_embed {
            return Err(LlmError::Inference("mock embedding failure".into()));
        }
        Ok(self.embed_sync(text))
    }

    fn supports_embeddings(&self) -> bool {
        self.embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    fn embedding_model(&self) -> &str {
        &self.model_id
    }
}

/// Scores passages by the fraction of distinct query terms they contain.
#[derive(Debug, Clone, Default)]
pub struct MockScorer {
    pub fail: bool,
}

impl RelevanceScorer for MockScorer {
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, LlmError> {
        if self.fail {
            return Err(LlmError::Inference("mock scorer failure".into()));
        }
        let mut terms: Vec<String> = tokens(query).collect();
        terms.sort_unstable();
        terms.dedup();
        if terms.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }
        #[allow(clippy::cast_precision_loss)]
        let total = terms.len() as f32;
        Ok(passages
            .iter()
            .map(|passage| {
                let words: Vec<String> = tokens(passage).collect();
                #[allow(clippy::cast_precision_loss)]
                let hits = terms.iter().filter(|t| words.contains(t)).count() as f32;
                hits / total
            })
            .collect())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock-scorer"
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[allow(clippy::cast_possible_truncation)]
fn bucket(token: &str, buckets: usize) -> usize {
    let hash = blake3::hash(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(head) % buckets as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let p = MockProvider::default();
        let a = p.embed("Metformin lowers blood glucose").await.unwrap();
        let b = p.embed("Metformin lowers blood glucose").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_MOCK_DIMENSION);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let p = MockProvider::default();
        let q = p.embed("what lowers blood glucose").await.unwrap();
        let related = p.embed("Metformin lowers blood glucose in diabetes").await.unwrap();
        let unrelated = p.embed("Aspirin inhibits platelet aggregation").await.unwrap();
        assert!(dot(&q, &related) > dot(&q, &unrelated));
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let p = MockProvider::default().with_dimension(8);
        let v = p.embed("   ").await.unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn queued_responses_then_default() {
        let p = MockProvider::with_responses(vec!["first".into()]);
        assert_eq!(p.chat(&[Message::user("q")]).await.unwrap(), "first");
        assert_eq!(p.chat(&[Message::user("q")]).await.unwrap(), "mock response");
        assert_eq!(p.received().len(), 2);
    }

    #[tokio::test]
    async fn failing_modes_return_errors() {
        assert!(MockProvider::failing().chat(&[]).await.is_err());
        let p = MockProvider::default().with_failing_embeddings();
        assert!(p.embed("x").await.is_err());
    }

    #[test]
    fn embedding_support_is_configurable() {
        assert!(MockProvider::default().supports_embeddings());
        assert!(!MockProvider::default().without_embeddings().supports_embeddings());
    }

    #[tokio::test]
    async fn every_token_lands_in_range() {
        let p = MockProvider::default().with_dimension(3);
        let v = p.embed("alpha beta gamma delta epsilon zeta eta theta").await.unwrap();
        assert_eq!(v.len(), 3);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn default_embed_batch_preserves_order() {
        let p = MockProvider::default();
        let texts = vec!["alpha".to_owned(), "beta".to_owned()];
        let batch = p.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], p.embed("alpha").await.unwrap());
        assert_eq!(batch[1], p.embed("beta").await.unwrap());
    }

    #[test]
    fn scorer_counts_term_overlap() {
        let scores = MockScorer::default()
            .score(
                "blood glucose",
                &["glucose in blood".into(), "only glucose".into(), "nothing".into()],
            )
            .unwrap();
        assert_eq!(scores, vec![1.0, 0.5, 0.0]);
    }
}
