//! Translation service: prompt building, serialized inference and validation

use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{TranslationRequest, TranslationResult, UsageStats};
use crate::core::prompt::PromptBuilder;
use crate::core::usage::UsageTracker;
use crate::core::validator::{extract_response, run_with_retry, LineCountValidator, RetryPolicy};
use crate::engine::{loader, InferenceSession, TextGenerator, TokenCodec};

/// Output of one pass over every prompt of a request
#[derive(Debug, Clone)]
struct Pass {
    text: String,
    prompt_tokens: usize,
    generated_tokens: usize,
}

impl AsRef<str> for Pass {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Receives generated text fragments while streaming is enabled
pub type StreamSink = Arc<dyn Fn(&str) + Send + Sync>;

fn stdout_sink() -> StreamSink {
    Arc::new(|text: &str| {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    })
}

/// Owns the loaded model and serves translation requests one at a time
#[derive(Clone)]
pub struct Translator {
    generator: Arc<Mutex<Box<dyn TextGenerator>>>,
    codec: Arc<dyn TokenCodec>,
    prompts: Arc<PromptBuilder>,
    config: Arc<TranslatorConfig>,
    usage: UsageTracker,
    sink: StreamSink,
    model_id: String,
}

impl Translator {
    /// Create a translator around an already loaded model
    pub fn new(
        config: TranslatorConfig,
        generator: Box<dyn TextGenerator>,
        codec: Arc<dyn TokenCodec>,
    ) -> Result<Self> {
        config.validate()?;

        let model_id = generator.model_id().to_string();
        let prompts = Arc::new(PromptBuilder::from_config(&config));

        info!(
            "Translator ready: model={}, prompt style={}, line validation={}",
            model_id,
            config.prompt_style,
            config.line_validation_enabled()
        );

        Ok(Self {
            generator: Arc::new(Mutex::new(generator)),
            codec,
            prompts,
            config: Arc::new(config),
            usage: UsageTracker::new(),
            sink: stdout_sink(),
            model_id,
        })
    }

    /// Send streamed fragments somewhere other than stdout
    pub fn with_stream_sink(mut self, sink: StreamSink) -> Self {
        self.sink = sink;
        self
    }

    /// Download (if needed) and load the configured model
    pub fn load(config: TranslatorConfig) -> Result<Self> {
        config.validate()?;
        let loaded = loader::load(&config)?;
        Self::new(config, Box::new(loaded.generator), loaded.tokenizer)
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        Self::load(TranslatorConfig::load(None)?)
    }

    /// Translate a request, retrying on line-count mismatch when enabled
    pub async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        if request.is_empty() {
            return Err(TranslationError::EmptyInput);
        }

        self.usage.record_request().await;

        let prompts = self.prompts.build(&request.lines, self.codec.as_ref())?;
        let chunks = prompts.len();
        let policy = RetryPolicy::from_config(&self.config);
        let validator = self
            .config
            .line_validation_enabled()
            .then(|| LineCountValidator::new(request.line_count()));

        info!(
            "Translating {} lines in {} chunk(s) with {}",
            request.lines.len(),
            chunks,
            self.model_id
        );

        let outcome = run_with_retry(&policy, validator.as_ref(), |attempt| {
            self.run_pass(&prompts, attempt)
        })
        .await;

        let validated = match outcome {
            Ok(validated) => validated,
            Err(e) => {
                if matches!(e, TranslationError::LineCountMismatch { .. }) {
                    self.usage.record_mismatch().await;
                }
                warn!("Translation failed: {}", e);
                return Err(e);
            }
        };

        Ok(TranslationResult {
            translation: validated.value.text,
            attempts: validated.attempts,
            chunks,
            prompt_tokens: validated.value.prompt_tokens,
            generated_tokens: validated.value.generated_tokens,
            model_used: self.model_id.clone(),
        })
    }

    /// Generate every prompt in order on the blocking pool, holding the model lock
    async fn run_pass(&self, prompts: &[String], attempt: u32) -> Result<Pass> {
        let params = self.config.generation_params(attempt);
        let marker = self.prompts.response_marker();
        let prompts = prompts.to_vec();
        let sink = Arc::clone(&self.sink);
        let mut generator = Arc::clone(&self.generator).lock_owned().await;

        let pass = tokio::task::spawn_blocking(move || -> Result<Pass> {
            let mut session = InferenceSession::new(&mut **generator);
            let mut on_text = |text: &str| sink(text);

            let total = prompts.len();
            let mut responses = Vec::with_capacity(total);
            let mut prompt_tokens = 0;
            let mut generated_tokens = 0;

            for (index, prompt) in prompts.iter().enumerate() {
                debug!("Generating chunk {}/{} (attempt {})", index + 1, total, attempt);
                let generation = session.generate(prompt, &params, &mut on_text)?;
                prompt_tokens += generation.prompt_tokens;
                generated_tokens += generation.generated_tokens;
                responses.push(extract_response(&generation.text, marker).to_string());
            }

            if params.stream {
                on_text("\n");
            }

            Ok(Pass {
                text: responses.join("\n"),
                prompt_tokens,
                generated_tokens,
            })
        })
        .await
        .map_err(|e| TranslationError::WorkerError {
            message: e.to_string(),
        })??;

        self.usage
            .record_attempt(attempt, pass.prompt_tokens, pass.generated_tokens)
            .await;

        Ok(pass)
    }

    /// Get current usage statistics
    pub async fn get_usage(&self) -> UsageStats {
        self.usage.get_stats().await
    }

    /// Identifier of the loaded model
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Active configuration
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }
}
