//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Request carried no text
    #[error("No text provided")]
    EmptyInput,

    /// Generated output never matched the input line count
    #[error("Line count mismatch after {attempts} attempts: expected {expected}, got {actual}")]
    LineCountMismatch {
        expected: usize,
        actual: usize,
        attempts: u32,
    },

    /// Prompt does not fit in the model context window
    #[error("Prompt of {prompt_tokens} tokens exceeds the model context of {context_length} tokens")]
    ContextOverflow {
        prompt_tokens: usize,
        context_length: usize,
    },

    /// Model weights or configuration could not be loaded
    #[error("Model load error: {message}")]
    ModelLoadError {
        message: String,
    },

    /// Tokenizer failed to load, encode or decode
    #[error("Tokenizer error: {message}")]
    TokenizerError {
        message: String,
    },

    /// Tensor or model runtime failure
    #[error("Inference error: {0}")]
    InferenceError(#[from] candle_core::Error),

    /// Blocking inference worker panicked or was cancelled
    #[error("Inference worker failed: {message}")]
    WorkerError {
        message: String,
    },

    /// Translation server answered with an error status
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Network error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// Invalid response from the translation server
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// File operation error
    #[error("File error: {path} - {message}")]
    FileError {
        path: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Wrapper for anyhow errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Model hub download error
    #[error("Model hub error: {0}")]
    HubError(#[from] hf_hub::api::sync::ApiError),
}

impl TranslationError {
    /// Wrap a tokenizer library error
    pub fn tokenizer(err: impl std::fmt::Display) -> Self {
        TranslationError::TokenizerError {
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for TranslationError {
    fn from(err: anyhow::Error) -> Self {
        TranslationError::InternalError(err.to_string())
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(err: config::ConfigError) -> Self {
        TranslationError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
