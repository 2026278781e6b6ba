//! Hugging Face tokenizer integration

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::core::errors::{Result, TranslationError};
use crate::engine::TokenCodec;

/// Tokens that end generation, in lookup order
const EOS_CANDIDATES: &[&str] = &[
    "<eos>",
    "<end_of_turn>",
    "</s>",
    "<|end_of_text|>",
    "<|eot_id|>",
];

impl TokenCodec for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        // Inherent methods are on the deref target, `TokenCodec` shadows them on `Tokenizer`
        let encoding = Deref::deref(self)
            .encode(text, false)
            .map_err(TranslationError::tokenizer)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Deref::deref(self)
            .decode(tokens, false)
            .map_err(TranslationError::tokenizer)
    }
}

/// Load `tokenizer.json`
pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path).map_err(|e| TranslationError::TokenizerError {
        message: format!("{}: {}", path.display(), e),
    })
}

/// End-of-sequence ids known to this vocabulary
pub fn eos_tokens(tokenizer: &Tokenizer) -> Vec<u32> {
    EOS_CANDIDATES
        .iter()
        .filter_map(|token| tokenizer.token_to_id(token))
        .collect()
}

/// Incremental decoder that only emits text once it forms complete
/// characters, so multi-token glyphs are never printed half-way.
pub struct TokenOutputStream {
    tokenizer: Arc<Tokenizer>,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenOutputStream {
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Deref::deref(&*self.tokenizer)
            .decode(tokens, true)
            .map_err(TranslationError::tokenizer)
    }

    /// Push a token, returning any newly completed text
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() && text.chars().last().is_some_and(char::is_alphanumeric) {
            let (_, fresh) = text.split_at(prev_text.len());
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(fresh.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Text still buffered after the last token
    pub fn decode_rest(&self) -> Result<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            let (_, fresh) = text.split_at(prev_text.len());
            Ok(Some(fresh.to_string()))
        } else {
            Ok(None)
        }
    }
}
