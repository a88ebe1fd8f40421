use std::sync::{Arc, Mutex};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, linear};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};

use super::loader::{hub_file, load_tokenizer};
use crate::error::LlmError;
use crate::rerank::RelevanceScorer;

const MAX_PAIR_LEN: usize = 512;

/// BERT cross-encoder that scores a (query, passage) pair jointly.
///
/// Expects a sequence-classification checkpoint with a single relevance
/// logit, such as the `cross-encoder/ms-marco-*` family.
#[derive(Clone)]
pub struct CrossEncoder {
    bert: Arc<BertModel>,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Arc<Tokenizer>,
    repo_id: String,
    device: Device,
    device_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CrossEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossEncoder")
            .field("repo_id", &self.repo_id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl CrossEncoder {
    /// # Errors
    ///
    /// Returns an error if download, weight loading, or tokenizer setup fails.
    pub fn load(
        repo_id: &str,
        device: &Device,
        device_lock: Arc<Mutex<()>>,
    ) -> Result<Self, LlmError> {
        let config_path = hub_file(repo_id, "config.json")?;
        let tokenizer_path = hub_file(repo_id, "tokenizer.json")?;
        let weights_path = hub_file(repo_id, "model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read reranker config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&config_str)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|h| usize::try_from(h).ok())
            .ok_or_else(|| LlmError::ModelLoad("reranker config has no hidden_size".into()))?;

        let mut tokenizer = load_tokenizer(&tokenizer_path)?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_PAIR_LEN,
                ..TruncationParams::default()
            }))
            .map_err(|e| LlmError::ModelLoad(format!("invalid truncation settings: {e}")))?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden_size, 1, vb.pp("classifier"))?;

        tracing::info!(repo_id, "reranker loaded");
        Ok(Self {
            bert: Arc::new(bert),
            pooler,
            classifier,
            tokenizer: Arc::new(tokenizer),
            repo_id: repo_id.to_owned(),
            device: device.clone(),
            device_lock,
        })
    }

    fn score_pair(&self, query: &str, passage: &str) -> Result<f32, LlmError> {
        let encoding = self
            .tokenizer
            .encode((query, passage), true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let hidden = self.bert.forward(&input_ids, &type_ids, None)?;

        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logit = self.classifier.forward(&pooled)?.squeeze(D::Minus1)?;
        let values = logit.to_vec1::<f32>()?;
        values
            .first()
            .copied()
            .ok_or_else(|| LlmError::Inference("reranker produced no logit".into()))
    }
}

impl RelevanceScorer for CrossEncoder {
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, LlmError> {
        let _guard = self
            .device_lock
            .lock()
            .map_err(|_| LlmError::DevicePoisoned)?;
        passages
            .iter()
            .map(|passage| self.score_pair(query, passage))
            .collect()
    }

    fn name(&self) -> &str {
        &self.repo_id
    }
}
