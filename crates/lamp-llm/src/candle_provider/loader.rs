use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_core::quantized::gguf_file;
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use crate::error::LlmError;

/// Where the generation model's GGUF weights come from.
///
/// Quantized repos on the hub rarely ship a tokenizer, so `HuggingFace`
/// sources name a separate repo to fetch `tokenizer.json` from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    Local {
        path: PathBuf,
    },
    HuggingFace {
        repo_id: String,
        filename: String,
        tokenizer_repo: String,
    },
}

pub struct LoadedModel {
    pub weights: ModelWeights,
    pub tokenizer: Tokenizer,
    pub eos_token_id: u32,
}

/// Load a GGUF generation model and its tokenizer.
///
/// # Errors
///
/// Returns an error if a file cannot be downloaded, read, or parsed.
pub fn load_chat_model(source: &ModelSource, device: &Device) -> Result<LoadedModel, LlmError> {
    let (model_path, tokenizer_path) = match source {
        ModelSource::Local { path } => {
            let tokenizer_path = path
                .parent()
                .map(|p| p.join("tokenizer.json"))
                .ok_or_else(|| {
                    LlmError::ModelLoad(format!("invalid model path: {}", path.display()))
                })?;
            (path.clone(), tokenizer_path)
        }
        ModelSource::HuggingFace {
            repo_id,
            filename,
            tokenizer_repo,
        } => (
            hub_file(repo_id, filename)?,
            hub_file(tokenizer_repo, "tokenizer.json")?,
        ),
    };

    tracing::info!(model = %model_path.display(), "loading generation model");
    let weights = load_gguf_weights(&model_path, device)?;
    let tokenizer = load_tokenizer(&tokenizer_path)?;
    let eos_token_id = resolve_eos_token(&tokenizer);
    Ok(LoadedModel {
        weights,
        tokenizer,
        eos_token_id,
    })
}

/// Fetch `filename` from a hub repo, reusing the local cache when present.
///
/// # Errors
///
/// Returns an error if the API client cannot be built or the download fails.
pub fn hub_file(repo_id: &str, filename: &str) -> Result<PathBuf, LlmError> {
    let api = hf_hub::api::sync::Api::new().map_err(|e| {
        LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
    })?;
    api.model(repo_id.to_owned())
        .get(filename)
        .map_err(|e| LlmError::ModelLoad(format!("failed to download {filename} from {repo_id}: {e}")))
}

fn load_gguf_weights(path: &Path, device: &Device) -> Result<ModelWeights, LlmError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        LlmError::ModelLoad(format!("failed to open GGUF file {}: {e}", path.display()))
    })?;
    let content = gguf_file::Content::read(&mut file)
        .map_err(|e| LlmError::ModelLoad(format!("failed to parse GGUF file: {e}")))?;
    ModelWeights::from_gguf(content, &mut file, device)
        .map_err(|e| LlmError::ModelLoad(format!("failed to load weights from GGUF: {e}")))
}

pub(crate) fn load_tokenizer(path: &Path) -> Result<Tokenizer, LlmError> {
    Tokenizer::from_file(path).map_err(|e| {
        LlmError::ModelLoad(format!("failed to load tokenizer from {}: {e}", path.display()))
    })
}

fn resolve_eos_token(tokenizer: &Tokenizer) -> u32 {
    const EOS_CANDIDATES: &[&str] = &[
        "</s>",
        "<|endoftext|>",
        "<|eot_id|>",
        "<|im_end|>",
        "<|end|>",
    ];

    EOS_CANDIDATES
        .iter()
        .find_map(|candidate| tokenizer.token_to_id(candidate))
        .unwrap_or(2)
}
