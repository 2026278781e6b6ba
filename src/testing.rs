//! Test doubles for the model runtime

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{Generation, GenerationParams};
use crate::engine::{TextGenerator, TokenCodec};

/// One token per character
pub struct CharCodec;

impl TokenCodec for CharCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .map(|&t| char::from_u32(t).ok_or_else(|| TranslationError::tokenizer("bad char")))
            .collect()
    }
}

/// Section of a prompt between its input header and the response marker
fn prompt_input(prompt: &str) -> &str {
    let start = ["### Input:\n", "# Input\n"]
        .iter()
        .find_map(|header| prompt.find(header).map(|i| i + header.len()))
        .unwrap_or(0);
    let end = prompt
        .rfind("# Response:")
        .map(|i| prompt[..i].trim_end_matches('#').len())
        .unwrap_or(prompt.len());
    prompt[start..end.max(start)].trim()
}

/// Answers with the prompt's input section unchanged
#[derive(Default)]
pub struct EchoGenerator {
    calls: Arc<AtomicUsize>,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl TextGenerator for EchoGenerator {
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = prompt_input(prompt).to_string();
        if params.stream {
            on_text(&text);
        }
        Ok(Generation {
            generated_tokens: text.chars().count(),
            prompt_tokens: prompt.chars().count(),
            text,
        })
    }

    fn model_id(&self) -> &str {
        "echo"
    }
}

/// Replays canned responses in order
pub struct ScriptedGenerator {
    responses: VecDeque<String>,
    repeat: Option<String>,
    calls: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            repeat: None,
            calls: Arc::default(),
            releases: Arc::default(),
        }
    }

    /// Answer every call with the same text
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            repeat: Some(response.into()),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn releases(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(
        &mut self,
        prompt: &str,
        _params: &GenerationParams,
        _on_text: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self
            .responses
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| TranslationError::InternalError("script exhausted".to_string()))?;
        Ok(Generation {
            prompt_tokens: prompt.len(),
            generated_tokens: text.len(),
            text,
        })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fails every call with a context overflow
pub struct OverflowGenerator {
    context_length: usize,
}

impl OverflowGenerator {
    pub fn new(context_length: usize) -> Self {
        Self { context_length }
    }
}

impl TextGenerator for OverflowGenerator {
    fn generate(
        &mut self,
        prompt: &str,
        _params: &GenerationParams,
        _on_text: &mut dyn FnMut(&str),
    ) -> Result<Generation> {
        Err(TranslationError::ContextOverflow {
            prompt_tokens: prompt.chars().count(),
            context_length: self.context_length,
        })
    }

    fn model_id(&self) -> &str {
        "overflow"
    }
}
