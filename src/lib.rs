//! SRT Translator - line-preserving subtitle translation on a local language model
//!
//! This library loads a causal language model with candle, serves it over an
//! HTTP API, and provides a client that translates `.srt` files through it.

#![deny(unsafe_code)]

pub mod cli;
pub mod core;
pub mod engine;
pub mod processors;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use core::{
    config::{ServerConfig, TranslatorConfig},
    errors::TranslationError,
    models::{LoadStrategy, PromptStyle, TextInput, TranslationRequest, TranslationResult},
    translator::Translator,
};

pub use processors::srt::SubtitleProcessor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
