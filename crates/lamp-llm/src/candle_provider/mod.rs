pub mod embed;
pub mod generate;
pub mod loader;
pub mod rerank;
pub mod template;

use std::sync::{Arc, Mutex};

pub use candle_core::Device;

use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

use self::embed::EmbedModel;
use self::generate::{GenerationConfig, GenerationOutput, generate_tokens};
use self::loader::{LoadedModel, ModelSource, load_chat_model};
use self::rerank::CrossEncoder;
use self::template::ChatTemplate;

/// Local inference backend: a quantized causal model for answers and a BERT
/// encoder for embeddings, sharing one device.
///
/// All forward passes take `device_lock`, so a single accelerator is never
/// driven by two requests at once.
#[derive(Clone)]
pub struct CandleProvider {
    weights: Arc<Mutex<ModelWeights>>,
    tokenizer: Arc<Tokenizer>,
    eos_token_id: u32,
    template: ChatTemplate,
    generation_config: GenerationConfig,
    embed_model: EmbedModel,
    device: Device,
    device_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CandleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleProvider")
            .field("template", &self.template)
            .field("generation_config", &self.generation_config)
            .field("device", &format!("{:?}", self.device))
            .field("embed_model", &self.embed_model)
            .finish_non_exhaustive()
    }
}

impl CandleProvider {
    /// Load the generation and embedding models onto `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if either model fails to download or load.
    pub fn new(
        source: &ModelSource,
        template: ChatTemplate,
        generation_config: GenerationConfig,
        embedding_repo: &str,
        max_seq_len: usize,
        device: Device,
    ) -> Result<Self, LlmError> {
        let LoadedModel {
            weights,
            tokenizer,
            eos_token_id,
        } = load_chat_model(source, &device)?;
        let embed_model = EmbedModel::load(embedding_repo, max_seq_len, &device)?;

        Ok(Self {
            weights: Arc::new(Mutex::new(weights)),
            tokenizer: Arc::new(tokenizer),
            eos_token_id,
            template,
            generation_config,
            embed_model,
            device,
            device_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Load a cross-encoder reranker that shares this provider's device.
    ///
    /// # Errors
    ///
    /// Returns an error if the reranker fails to download or load.
    pub fn load_reranker(&self, repo_id: &str) -> Result<CrossEncoder, LlmError> {
        CrossEncoder::load(repo_id, &self.device, Arc::clone(&self.device_lock))
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        match &self.device {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Metal(_) => "metal",
        }
    }

    fn generate_sync(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt = self.template.format(messages);
        let encoding = self
            .tokenizer
            .encode(prompt.as_str(), false)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let _guard = self
            .device_lock
            .lock()
            .map_err(|_| LlmError::DevicePoisoned)?;
        let mut weights = self.weights.lock().map_err(|_| LlmError::DevicePoisoned)?;
        let mut forward_fn = |input: &candle_core::Tensor, pos: usize| {
            weights.forward(input, pos).map_err(LlmError::Candle)
        };

        let GenerationOutput {
            text,
            tokens_generated,
        } = generate_tokens(
            &mut forward_fn,
            &self.tokenizer,
            encoding.get_ids(),
            &self.generation_config,
            self.eos_token_id,
            &self.device,
        )?;

        tracing::debug!(
            prompt_tokens = encoding.get_ids().len(),
            tokens_generated,
            "generation finished"
        );
        let text = text.trim().to_owned();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "candle" });
        }
        Ok(text)
    }
}

impl LlmProvider for CandleProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let provider = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || provider.generate_sync(&messages))
            .await
            .map_err(|e| LlmError::Inference(format!("candle generation task failed: {e}")))?
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self.embed_model.clone();
        let lock = Arc::clone(&self.device_lock);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| LlmError::DevicePoisoned)?;
            model.embed_sync(&text)
        })
        .await
        .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self.embed_model.clone();
        let lock = Arc::clone(&self.device_lock);
        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| LlmError::DevicePoisoned)?;
            model.embed_batch_sync(&texts)
        })
        .await
        .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))??;
        Ok(vectors)
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "candle"
    }

    fn embedding_model(&self) -> &str {
        self.embed_model.repo_id()
    }
}
