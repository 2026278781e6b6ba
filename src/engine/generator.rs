//! Autoregressive generation on candle models

use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{gemma2, quantized_llama};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{Generation, GenerationParams};
use crate::engine::tokenizer::TokenOutputStream;
use crate::engine::TextGenerator;

/// Loaded network weights
pub enum ModelWeights {
    /// Full-precision or half-precision Gemma-2
    Gemma2(gemma2::Model),
    /// 4-bit GGUF llama-family weights
    Quantized(quantized_llama::ModelWeights),
}

impl ModelWeights {
    /// Logits for the last position of `input`, flattened to the vocabulary
    fn forward(&mut self, input: &Tensor, offset: usize) -> candle_core::Result<Tensor> {
        let logits = match self {
            ModelWeights::Gemma2(model) => model.forward(input, offset)?,
            ModelWeights::Quantized(model) => model.forward(input, offset)?,
        };
        logits.flatten_all()?.to_dtype(DType::F32)
    }

    fn clear_kv_cache(&mut self) {
        match self {
            ModelWeights::Gemma2(model) => model.clear_kv_cache(),
            // Cache is rebuilt whenever a pass starts at position 0
            ModelWeights::Quantized(_) => {}
        }
    }

    /// Drop attention state kept from the last pass
    fn release_cache(&mut self, device: &Device, token: u32) -> candle_core::Result<()> {
        match self {
            ModelWeights::Gemma2(model) => model.clear_kv_cache(),
            // No clear hook: a one-token pass at position 0 replaces every layer cache
            ModelWeights::Quantized(model) => {
                let input = Tensor::new(&[token], device)?.unsqueeze(0)?;
                model.forward(&input, 0)?;
            }
        }
        Ok(())
    }
}

/// Largest number of tokens that may still be generated after the prompt
pub fn generation_budget(
    context_length: Option<usize>,
    prompt_tokens: usize,
    requested: usize,
) -> Result<usize> {
    match context_length {
        Some(context_length) if prompt_tokens >= context_length => {
            Err(TranslationError::ContextOverflow {
                prompt_tokens,
                context_length,
            })
        }
        Some(context_length) => Ok(requested.min(context_length - prompt_tokens)),
        None => Ok(requested),
    }
}

/// [`TextGenerator`] backed by a candle model and its tokenizer
pub struct CandleGenerator {
    model: ModelWeights,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    model_id: String,
    eos_tokens: Vec<u32>,
    context_length: Option<usize>,
}

impl CandleGenerator {
    pub fn new(
        model: ModelWeights,
        tokenizer: Arc<Tokenizer>,
        device: Device,
        model_id: impl Into<String>,
        eos_tokens: Vec<u32>,
        context_length: Option<usize>,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
            model_id: model_id.into(),
            eos_tokens,
            context_length,
        }
    }
}

impl TextGenerator for CandleGenerator {
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(TranslationError::tokenizer)?;
        let mut tokens = encoding.get_ids().to_vec();
        let prompt_tokens = tokens.len();
        let budget = generation_budget(self.context_length, prompt_tokens, params.max_new_tokens)?;

        let mut logits_processor = LogitsProcessor::new(params.seed, params.temperature, params.top_p);
        let mut stream = TokenOutputStream::new(Arc::clone(&self.tokenizer));
        let mut generated = Vec::new();
        let start = Instant::now();

        self.model.clear_kv_cache();

        for index in 0..budget {
            let (context, offset) = if params.use_kv_cache && index > 0 {
                let last = tokens.len() - 1;
                (&tokens[last..], last)
            } else {
                if index > 0 {
                    self.model.clear_kv_cache();
                }
                (&tokens[..], 0)
            };

            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, offset)?;
            let logits = if params.repeat_penalty == 1.0 {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(params.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repeat_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            tokens.push(next_token);

            if self.eos_tokens.contains(&next_token) {
                break;
            }
            generated.push(next_token);

            if params.stream {
                if let Some(text) = stream.next_token(next_token)? {
                    on_text(&text);
                }
            }
        }

        if params.stream {
            if let Some(rest) = stream.decode_rest()? {
                on_text(&rest);
            }
        }

        let elapsed = start.elapsed();
        info!(
            "{} tokens generated in {:.2}s ({:.2} tok/s)",
            generated.len(),
            elapsed.as_secs_f64(),
            generated.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        );

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(TranslationError::tokenizer)?;

        Ok(Generation {
            text,
            prompt_tokens,
            generated_tokens: generated.len(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn release(&mut self) {
        debug!("Releasing inference state for {}", self.model_id);
        let token = self.eos_tokens.first().copied().unwrap_or(0);
        if let Err(e) = self.model.release_cache(&self.device, token) {
            warn!("Failed to release inference state: {}", e);
        }
    }
}
