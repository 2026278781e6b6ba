//! Configuration management

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{GenerationParams, LoadStrategy, PromptStyle};

/// Default fine-tuned subtitle model
pub const DEFAULT_MODEL_ID: &str = "ilarramendi/srt-translate-gemma-2-1epoch";

/// Default listen port
pub const DEFAULT_PORT: u16 = 45313;

/// Prefix for environment overrides layered on top of a config file
const FILE_ENV_PREFIX: &str = "SRT_TRANSLATOR";

/// Configuration for translator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub model_id: String,
    pub revision: String,
    #[serde(skip_serializing)]
    pub hf_token: Option<String>,
    pub load_strategy: LoadStrategy,
    pub gguf_repo: Option<String>,
    pub gguf_file: Option<String>,
    pub tokenizer_repo: Option<String>,
    pub force_cpu: bool,
    pub use_flash_attn: bool,
    pub prompt_style: PromptStyle,
    pub target_language: String,
    pub chunk_size: usize,
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub use_kv_cache: bool,
    pub stream_output: bool,
    pub validate_line_count: Option<bool>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_temperature: f64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            hf_token: None,
            load_strategy: LoadStrategy::Memory,
            gguf_repo: None,
            gguf_file: None,
            tokenizer_repo: None,
            force_cpu: false,
            use_flash_attn: false,
            prompt_style: PromptStyle::Chunked,
            target_language: "Spanish".to_string(),
            chunk_size: 1000,
            max_new_tokens: None,
            temperature: None,
            top_p: None,
            seed: 42,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
            use_kv_cache: false,
            stream_output: true,
            validate_line_count: None,
            max_attempts: 3,
            retry_delay_ms: 500,
            retry_temperature: 0.7,
        }
    }
}

/// Read an environment variable, falling back to a default when unset
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map_err(|e| TranslationError::ConfigError {
            message: format!("Invalid value for {}: {}", key, e),
        }),
        Err(_) => Ok(default),
    }
}

/// Read an optional environment variable
fn env_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TranslationError::ConfigError {
                message: format!("Invalid value for {}: {}", key, e),
            }),
        _ => Ok(None),
    }
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            model_id: env_or("MODEL_ID", defaults.model_id)?,
            revision: env_or("MODEL_REVISION", defaults.revision)?,
            hf_token: env_opt("HF_TOKEN")?,
            load_strategy: env_or("LOAD_STRATEGY", defaults.load_strategy)?,
            gguf_repo: env_opt("GGUF_REPO")?,
            gguf_file: env_opt("GGUF_FILE")?,
            tokenizer_repo: env_opt("TOKENIZER_REPO")?,
            force_cpu: env_or("FORCE_CPU", defaults.force_cpu)?,
            use_flash_attn: env_or("USE_FLASH_ATTN", defaults.use_flash_attn)?,
            prompt_style: env_or("PROMPT_STYLE", defaults.prompt_style)?,
            target_language: env_or("TARGET_LANGUAGE", defaults.target_language)?,
            chunk_size: env_or("CHUNK_SIZE", defaults.chunk_size)?,
            max_new_tokens: env_opt("MAX_NEW_TOKENS")?,
            temperature: env_opt("TEMPERATURE")?,
            top_p: env_opt("TOP_P")?,
            seed: env_or("SEED", defaults.seed)?,
            repeat_penalty: env_or("REPEAT_PENALTY", defaults.repeat_penalty)?,
            repeat_last_n: env_or("REPEAT_LAST_N", defaults.repeat_last_n)?,
            use_kv_cache: env_or("USE_KV_CACHE", defaults.use_kv_cache)?,
            stream_output: env_or("STREAM_OUTPUT", defaults.stream_output)?,
            validate_line_count: env_opt("VALIDATE_LINE_COUNT")?,
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            retry_temperature: env_or("RETRY_TEMPERATURE", defaults.retry_temperature)?,
        })
    }

    /// Load from a TOML, YAML or JSON file with `SRT_TRANSLATOR_*` overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TranslationError::FileError {
                path: path.display().to_string(),
                message: "Config file not found".to_string(),
            });
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(FILE_ENV_PREFIX).try_parsing(true))
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        if config.hf_token.is_none() {
            config.hf_token = env_opt("HF_TOKEN")?;
        }

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from a file when given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(TranslationError::ConfigError {
                message: message.to_string(),
            })
        };

        if self.model_id.trim().is_empty() {
            return invalid("model_id is required");
        }

        if self.chunk_size == 0 {
            return invalid("chunk_size must be greater than 0");
        }

        if self.max_attempts == 0 {
            return invalid("max_attempts must be greater than 0");
        }

        if matches!(self.max_new_tokens, Some(0)) {
            return invalid("max_new_tokens must be greater than 0");
        }

        if self.temperature.map(|t| t < 0.0).unwrap_or(false) || self.retry_temperature < 0.0 {
            return invalid("temperature must not be negative");
        }

        if let Some(top_p) = self.top_p {
            if top_p <= 0.0 || top_p > 1.0 {
                return invalid("top_p must be in (0, 1]");
            }
        }

        if self.use_flash_attn && !cfg!(feature = "flash-attn") {
            return invalid("use_flash_attn requires building with the flash-attn feature");
        }

        if self.load_strategy == LoadStrategy::Quantized
            && (self.gguf_repo.is_none() || self.gguf_file.is_none())
        {
            return invalid("quantized loading requires gguf_repo and gguf_file");
        }

        if self.prompt_style == PromptStyle::Chunked && self.validate_line_count == Some(true) {
            warn!("Line validation with chunked prompts may retry often: chunks can split lines");
        }

        Ok(())
    }

    /// Effective generation budget
    pub fn max_new_tokens(&self) -> usize {
        self.max_new_tokens
            .unwrap_or_else(|| self.prompt_style.default_max_new_tokens())
    }

    /// Whether generated output is checked against the input line count
    pub fn line_validation_enabled(&self) -> bool {
        self.validate_line_count
            .unwrap_or_else(|| self.prompt_style.default_validation())
    }

    /// Repository holding `tokenizer.json`
    pub fn tokenizer_repo(&self) -> &str {
        self.tokenizer_repo.as_deref().unwrap_or(&self.model_id)
    }

    /// Generation parameters for the given attempt (1-based)
    pub fn generation_params(&self, attempt: u32) -> GenerationParams {
        let retry = attempt > 1;
        GenerationParams {
            max_new_tokens: self.max_new_tokens(),
            temperature: if retry {
                self.temperature.or(Some(self.retry_temperature))
            } else {
                self.temperature
            },
            top_p: self.top_p,
            seed: self.seed.wrapping_add(u64::from(attempt.saturating_sub(1))),
            repeat_penalty: self.repeat_penalty,
            repeat_last_n: self.repeat_last_n,
            use_kv_cache: self.use_kv_cache,
            stream: self.stream_output,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Socket address string for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_validation() {
        let config = TranslatorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_chunk_size() {
        let config = TranslatorConfig {
            chunk_size: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_attempts() {
        let config = TranslatorConfig {
            max_attempts: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_quantized_requires_gguf() {
        let mut config = TranslatorConfig {
            load_strategy: LoadStrategy::Quantized,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.gguf_repo = Some("TheBloke/Llama-2-7B-Chat-GGUF".to_string());
        config.gguf_file = Some("llama-2-7b-chat.Q4_K_M.gguf".to_string());
        assert!(config.validate().is_ok());
    }

    #[cfg(not(feature = "flash-attn"))]
    #[test]
    fn test_flash_attn_needs_feature() {
        let config = TranslatorConfig {
            use_flash_attn: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TranslationError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_config_validation_top_p_range() {
        let config = TranslatorConfig {
            top_p: Some(1.5),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_style_dependent_defaults() {
        let chunked = TranslatorConfig::default();
        assert_eq!(chunked.max_new_tokens(), 4000);
        assert!(!chunked.line_validation_enabled());

        let template = TranslatorConfig {
            prompt_style: PromptStyle::Template,
            ..Default::default()
        };
        assert_eq!(template.max_new_tokens(), 999_999);
        assert!(template.line_validation_enabled());

        let overridden = TranslatorConfig {
            prompt_style: PromptStyle::Template,
            validate_line_count: Some(false),
            max_new_tokens: Some(512),
            ..Default::default()
        };
        assert_eq!(overridden.max_new_tokens(), 512);
        assert!(!overridden.line_validation_enabled());
    }

    #[test]
    fn test_retry_attempts_vary_sampling() {
        let config = TranslatorConfig::default();

        let first = config.generation_params(1);
        assert_eq!(first.temperature, None);
        assert_eq!(first.seed, 42);

        let second = config.generation_params(2);
        assert_eq!(second.temperature, Some(0.7));
        assert_eq!(second.seed, 43);
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "prompt_style = \"template\"").unwrap();
        writeln!(file, "target_language = \"French\"").unwrap();
        writeln!(file, "chunk_size = 512").unwrap();

        let config = TranslatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.prompt_style, PromptStyle::Template);
        assert_eq!(config.target_language, "French");
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_from_file_missing() {
        let result = TranslatorConfig::from_file("/nonexistent/translator.toml");
        assert!(matches!(result, Err(TranslationError::FileError { .. })));
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(ServerConfig::default().addr(), "0.0.0.0:45313");
        assert_eq!(ServerConfig::new("127.0.0.1", 8080).addr(), "127.0.0.1:8080");
    }
}
