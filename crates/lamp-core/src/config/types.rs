use lamp_index::InputType;
use serde::{Deserialize, Serialize};

use crate::prompt::PromptPreset;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Candle,
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candle => "candle",
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_max_seq_len")]
    pub embedding_max_seq_len: usize,
    /// `cpu`, `cuda`, `metal`, or `auto`.
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub candle: CandleConfig,
    #[serde(default)]
    pub generation: GenerationParams,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L12-v2".into()
}

fn default_embedding_max_seq_len() -> usize {
    128
}

fn default_device() -> String {
    "auto".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            embedding_model: default_embedding_model(),
            embedding_max_seq_len: default_embedding_max_seq_len(),
            device: default_device(),
            candle: CandleConfig::default(),
            generation: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CandleConfig {
    /// `huggingface` or `local`.
    #[serde(default = "default_candle_source")]
    pub source: String,
    #[serde(default)]
    pub local_path: String,
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_tokenizer_repo")]
    pub tokenizer_repo: String,
    #[serde(default = "default_chat_template")]
    pub chat_template: String,
}

fn default_candle_source() -> String {
    "huggingface".into()
}

fn default_repo_id() -> String {
    "TheBloke/zephyr-7B-beta-GGUF".into()
}

fn default_filename() -> String {
    "zephyr-7b-beta.Q4_K_M.gguf".into()
}

fn default_tokenizer_repo() -> String {
    "HuggingFaceH4/zephyr-7b-beta".into()
}

fn default_chat_template() -> String {
    "zephyr".into()
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            source: default_candle_source(),
            local_path: String::new(),
            repo_id: default_repo_id(),
            filename: default_filename(),
            tokenizer_repo: default_tokenizer_repo(),
            chat_template: default_chat_template(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerationParams {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default = "default_top_k")]
    pub top_k: Option<usize>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
}

pub(crate) const MAX_NEW_TOKENS_CAP: usize = 32768;

impl GenerationParams {
    #[must_use]
    pub fn capped_max_new_tokens(&self) -> usize {
        self.max_new_tokens.min(MAX_NEW_TOKENS_CAP)
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: None,
            top_k: default_top_k(),
            max_new_tokens: default_max_new_tokens(),
            seed: default_seed(),
            repeat_penalty: default_repeat_penalty(),
            repeat_last_n: default_repeat_last_n(),
        }
    }
}

fn default_temperature() -> f64 {
    0.2
}

#[allow(clippy::unnecessary_wraps)]
fn default_top_k() -> Option<usize> {
    Some(50)
}

fn default_max_new_tokens() -> usize {
    500
}

fn default_seed() -> u64 {
    42
}

fn default_repeat_penalty() -> f32 {
    1.1
}

fn default_repeat_last_n() -> usize {
    64
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: String,
    #[serde(default = "default_document_path")]
    pub document_path: String,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_index_path() -> String {
    "indexes/lamp_index".into()
}

fn default_document_path() -> String {
    "data/bioc".into()
}

fn default_group_size() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    20
}

fn default_max_files() -> usize {
    250_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            document_path: default_document_path(),
            input_type: InputType::default(),
            group_size: default_group_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_files: default_max_files(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_num_retrieved_docs")]
    pub num_retrieved_docs: usize,
    #[serde(default = "default_num_docs_final")]
    pub num_docs_final: usize,
    /// Cross-encoder repository; absent disables reranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker: Option<String>,
}

fn default_num_retrieved_docs() -> usize {
    100
}

fn default_num_docs_final() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_retrieved_docs: default_num_retrieved_docs(),
            num_docs_final: default_num_docs_final(),
            reranker: None,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub preset: PromptPreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Must contain `{context}` and `{question}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Requests per minute per client IP; 0 disables limiting.
    #[serde(default = "default_gateway_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

fn default_gateway_bind() -> String {
    "0.0.0.0".into()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_rate_limit() -> u32 {
    120
}

fn default_gateway_max_body() -> usize {
    1_048_576
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: None,
            rate_limit: default_gateway_rate_limit(),
            max_body_size: default_gateway_max_body(),
        }
    }
}
