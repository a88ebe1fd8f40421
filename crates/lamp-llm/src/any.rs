#[cfg(feature = "candle")]
use crate::candle_provider::CandleProvider;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::provider::{LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match *$self {
            #[cfg(feature = "candle")]
            AnyProvider::Candle(ref $p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock(ref $p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    #[cfg(feature = "candle")]
    Candle(CandleProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }

    fn embedding_model(&self) -> &str {
        delegate_provider!(self, |p| p.embedding_model())
    }
}
