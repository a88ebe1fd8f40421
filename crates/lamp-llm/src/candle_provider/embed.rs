use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};

use super::loader::{hub_file, load_tokenizer};
use crate::error::LlmError;

/// Inputs longer than this many tokens are truncated before embedding.
pub const DEFAULT_MAX_SEQ_LEN: usize = 128;

/// Sentence embedding model: BERT encoder, mean pooling, L2 normalization.
#[derive(Clone)]
pub struct EmbedModel {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    repo_id: String,
    device: Device,
}

impl std::fmt::Debug for EmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedModel")
            .field("repo_id", &self.repo_id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl EmbedModel {
    /// Load a BERT sentence-embedding model from `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(repo_id: &str, max_seq_len: usize, device: &Device) -> Result<Self, LlmError> {
        let config_path = hub_file(repo_id, "config.json")?;
        let tokenizer_path = hub_file(repo_id, "tokenizer.json")?;
        let weights_path = hub_file(repo_id, "model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let mut tokenizer = load_tokenizer(&tokenizer_path)?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_len,
                ..TruncationParams::default()
            }))
            .map_err(|e| LlmError::ModelLoad(format!("invalid truncation settings: {e}")))?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };
        let model = BertModel::load(vb, &config)?;

        tracing::info!(repo_id, max_seq_len, "embedding model loaded");
        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            repo_id: repo_id.to_owned(),
            device: device.clone(),
        })
    }

    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Embed one text into a unit-length vector.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the model forward pass fails.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let type_ids = encoding.get_type_ids();

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;

        // Mean over the sequence; inputs are unpadded so every position counts.
        let pooled = hidden.mean(1)?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norm)?.squeeze(0)?;
        normalized.to_vec1::<f32>().map_err(LlmError::Candle)
    }

    /// Embed texts in order.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error encountered.
    pub fn embed_batch_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        texts.iter().map(|t| self.embed_sync(t)).collect()
    }
}
