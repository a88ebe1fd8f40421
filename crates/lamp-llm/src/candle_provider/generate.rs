use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};

use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub max_tokens: usize,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: None,
            top_k: Some(50),
            max_tokens: 500,
            seed: 42,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

impl GenerationConfig {
    /// Sampling strategy implied by the configured knobs. A non-positive
    /// temperature means greedy decoding.
    #[must_use]
    pub fn sampling(&self) -> Sampling {
        if self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        let temperature = self.temperature;
        match (self.top_k, self.top_p) {
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (None, None) => Sampling::All { temperature },
        }
    }
}

pub struct GenerationOutput {
    pub text: String,
    pub tokens_generated: usize,
}

/// Run the autoregressive loop and decode only the newly generated tokens.
///
/// `forward_fn` abstracts over the model's forward pass so the loop can be
/// driven by any causal model holding its own KV cache.
///
/// # Errors
///
/// Returns an error if the forward pass or token decoding fails.
pub fn generate_tokens<F>(
    forward_fn: &mut F,
    tokenizer: &tokenizers::Tokenizer,
    prompt_tokens: &[u32],
    config: &GenerationConfig,
    eos_token_id: u32,
    device: &Device,
) -> Result<GenerationOutput, LlmError>
where
    F: FnMut(&Tensor, usize) -> Result<Tensor, LlmError>,
{
    if prompt_tokens.is_empty() || config.max_tokens == 0 {
        return Ok(GenerationOutput {
            text: String::new(),
            tokens_generated: 0,
        });
    }

    let mut logits_processor = LogitsProcessor::from_sampling(config.seed, config.sampling());
    let mut history: Vec<u32> = prompt_tokens.to_vec();
    let mut generated: Vec<u32> = Vec::with_capacity(config.max_tokens);

    let mut input = Tensor::new(prompt_tokens, device)?.unsqueeze(0)?;
    let mut pos = 0;

    while generated.len() < config.max_tokens {
        let step_len = input.dim(1)?;
        let logits = forward_fn(&input, pos)?;
        pos += step_len;

        let logits = last_position(&logits.squeeze(0)?.to_dtype(DType::F32)?)?;
        let logits = apply_repeat_penalty(
            &logits,
            &history,
            config.repeat_penalty,
            config.repeat_last_n,
        )?;

        let next = logits_processor.sample(&logits)?;
        if next == eos_token_id {
            break;
        }
        generated.push(next);
        history.push(next);
        input = Tensor::new(&[next], device)?.unsqueeze(0)?;
    }

    let text = tokenizer
        .decode(&generated, true)
        .map_err(|e| LlmError::Inference(format!("tokenizer decode failed: {e}")))?;
    Ok(GenerationOutput {
        text,
        tokens_generated: generated.len(),
    })
}

// Models return either [seq, vocab] or an already-sliced [vocab].
fn last_position(logits: &Tensor) -> Result<Tensor, LlmError> {
    if logits.dims().len() > 1 {
        let seq_len = logits.dim(0)?;
        Ok(logits.get(seq_len - 1)?)
    } else {
        Ok(logits.clone())
    }
}

fn apply_repeat_penalty(
    logits: &Tensor,
    tokens: &[u32],
    penalty: f32,
    last_n: usize,
) -> Result<Tensor, LlmError> {
    if (penalty - 1.0).abs() < f32::EPSILON {
        return Ok(logits.clone());
    }
    let start = tokens.len().saturating_sub(last_n);
    candle_transformers::utils::apply_repeat_penalty(logits, penalty, &tokens[start..])
        .map_err(LlmError::Candle)
}
