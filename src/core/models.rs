//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::{Result, TranslationError};

/// How model weights are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Full safetensors weights in reduced precision
    #[default]
    Memory,
    /// 4-bit GGUF weights
    #[serde(alias = "4bit")]
    Quantized,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Memory => write!(f, "memory"),
            LoadStrategy::Quantized => write!(f, "quantized"),
        }
    }
}

impl FromStr for LoadStrategy {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(LoadStrategy::Memory),
            "quantized" | "4bit" => Ok(LoadStrategy::Quantized),
            other => Err(TranslationError::ConfigError {
                message: format!("Unknown load strategy: {}", other),
            }),
        }
    }
}

/// How input lines are turned into prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Token windows, each wrapped in the subtitle instruction prompt
    #[default]
    Chunked,
    /// Whole input in the instruction/input/response template
    Template,
}

impl PromptStyle {
    /// Generation budget used when none is configured
    pub fn default_max_new_tokens(&self) -> usize {
        match self {
            PromptStyle::Chunked => 4000,
            PromptStyle::Template => 999_999,
        }
    }

    /// Whether line-count validation runs when not configured
    pub fn default_validation(&self) -> bool {
        match self {
            PromptStyle::Chunked => false,
            PromptStyle::Template => true,
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptStyle::Chunked => write!(f, "chunked"),
            PromptStyle::Template => write!(f, "template"),
        }
    }
}

impl FromStr for PromptStyle {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chunked" => Ok(PromptStyle::Chunked),
            "template" => Ok(PromptStyle::Template),
            other => Err(TranslationError::ConfigError {
                message: format!("Unknown prompt style: {}", other),
            }),
        }
    }
}

/// Text as submitted over HTTP: one newline-separated string or a list of lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextInput {
    Single(String),
    Lines(Vec<String>),
}

impl TextInput {
    pub fn is_empty(&self) -> bool {
        match self {
            TextInput::Single(text) => text.is_empty(),
            TextInput::Lines(lines) => lines.is_empty(),
        }
    }

    pub fn into_lines(self) -> Vec<String> {
        match self {
            TextInput::Single(text) => text.split('\n').map(str::to_string).collect(),
            TextInput::Lines(lines) => lines,
        }
    }
}

/// Translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub lines: Vec<String>,
}

impl TranslationRequest {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Build from HTTP input, rejecting missing or empty text
    pub fn from_input(input: Option<TextInput>) -> Result<Self> {
        match input {
            Some(input) if !input.is_empty() => Ok(Self::new(input.into_lines())),
            _ => Err(TranslationError::EmptyInput),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Input as one newline-joined block
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Number of newline-delimited lines the output must reproduce
    pub fn line_count(&self) -> usize {
        self.lines.iter().map(|line| line.split('\n').count()).sum()
    }
}

/// Translation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translation: String,
    pub attempts: u32,
    pub chunks: usize,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub model_used: String,
}

/// Sampling and budget settings for a single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub use_kv_cache: bool,
    pub stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: PromptStyle::Chunked.default_max_new_tokens(),
            temperature: None,
            top_p: None,
            seed: 42,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
            use_kv_cache: false,
            stream: false,
        }
    }
}

/// Output of one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
}

/// Process-lifetime usage counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub requests: u64,
    pub attempts: u64,
    pub retries: u64,
    pub line_mismatches: u64,
    pub prompt_tokens: u64,
    pub generated_tokens: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self {
            requests: 0,
            attempts: 0,
            retries: 0,
            line_mismatches: 0,
            prompt_tokens: 0,
            generated_tokens: 0,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.generated_tokens
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new()
    }
}
