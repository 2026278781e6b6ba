//! Model runtime: tokenization and text generation
//!
//! The translation service only talks to the two traits defined here.
//! [`generator::CandleGenerator`] is the production implementation, built
//! by [`loader::load`] according to the configured [`LoadStrategy`].
//!
//! [`LoadStrategy`]: crate::core::models::LoadStrategy

pub mod generator;
pub mod loader;
pub mod tokenizer;

use std::ops::{Deref, DerefMut};

use crate::core::errors::Result;
use crate::core::models::{Generation, GenerationParams};

/// Converts between text and token ids
pub trait TokenCodec: Send + Sync {
    /// Encode text without adding special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode ids back to text, keeping special tokens
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

/// A causal language model that continues a prompt
pub trait TextGenerator: Send {
    /// Generate a continuation of `prompt`.
    ///
    /// The returned text holds only newly generated tokens, decoded with
    /// special tokens stripped. When `params.stream` is set, decoded
    /// fragments are passed to `on_text` as they are produced.
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Generation>;

    /// Identifier of the loaded model
    fn model_id(&self) -> &str;

    /// Drop per-request device state such as the KV cache
    fn release(&mut self) {}
}

/// Exclusive use of a generator for one request.
///
/// Per-request device state is released when the session is dropped, so
/// error paths clean up the same way as successful ones.
pub struct InferenceSession<'a, G: TextGenerator + ?Sized> {
    generator: &'a mut G,
}

impl<'a, G: TextGenerator + ?Sized> InferenceSession<'a, G> {
    pub fn new(generator: &'a mut G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator + ?Sized> Deref for InferenceSession<'_, G> {
    type Target = G;

    fn deref(&self) -> &G {
        self.generator
    }
}

impl<G: TextGenerator + ?Sized> DerefMut for InferenceSession<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.generator
    }
}

impl<G: TextGenerator + ?Sized> Drop for InferenceSession<'_, G> {
    fn drop(&mut self) {
        self.generator.release();
    }
}
