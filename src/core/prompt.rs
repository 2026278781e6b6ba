//! Prompt construction for subtitle translation

use tracing::debug;

use crate::core::config::TranslatorConfig;
use crate::core::errors::Result;
use crate::core::models::PromptStyle;
use crate::engine::TokenCodec;

/// Marker that precedes the model answer in chunked prompts
pub const CHUNKED_RESPONSE_MARKER: &str = "# Response:";

/// Marker that precedes the model answer in template prompts
pub const TEMPLATE_RESPONSE_MARKER: &str = "### Response:";

/// Default token window for chunked prompts
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Builds finished prompts from raw subtitle lines
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    style: PromptStyle,
    target_language: String,
    chunk_size: usize,
}

impl PromptBuilder {
    pub fn new(style: PromptStyle, target_language: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            style,
            target_language: target_language.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::new(config.prompt_style, config.target_language.clone(), config.chunk_size)
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// Marker after which the model answer starts
    pub fn response_marker(&self) -> &'static str {
        match self.style {
            PromptStyle::Chunked => CHUNKED_RESPONSE_MARKER,
            PromptStyle::Template => TEMPLATE_RESPONSE_MARKER,
        }
    }

    /// Build one prompt per chunk (chunked) or a single prompt (template)
    pub fn build(&self, lines: &[String], codec: &dyn TokenCodec) -> Result<Vec<String>> {
        match self.style {
            PromptStyle::Chunked => {
                let chunks = chunk_tokens(lines, codec, self.chunk_size)?;
                debug!(
                    "Split {} lines into {} chunk(s) of up to {} tokens",
                    lines.len(),
                    chunks.len(),
                    self.chunk_size
                );
                chunks
                    .iter()
                    .map(|chunk| Ok(self.subtitle_prompt(&codec.decode(chunk)?)))
                    .collect()
            }
            PromptStyle::Template => Ok(vec![self.instruction_prompt(&lines.join("\n"))]),
        }
    }

    fn subtitle_prompt(&self, input: &str) -> String {
        format!(
            "\nYou are an experienced semantic translator.\n\
             You will recieve text lines and your goal is to translate them to {language}, remember:\n\
             \n\
             - ALWAYS remove non-text content from the subtitles, like HTML tags, or anything that is not readable by a human.\n\
             - ALWAYS return the SAME number of lines\n\
             - NEVER skip any line.\n\
             - NEVER combine lines.\n\
             - ALWAYS remove branding, ads or urls that are not related to the content.\n\
             \n\
             # Input\n\
             {input}\n\
             \n\
             {marker}\n",
            language = self.target_language,
            input = input,
            marker = CHUNKED_RESPONSE_MARKER,
        )
    }

    fn instruction_prompt(&self, input: &str) -> String {
        format!(
            "Below is an instruction that describes a task, paired with an input that provides further context. \
             Write a response that appropriately completes the request.\n\
             \n\
             ### Instruction:\n\
             Translate the text to {language}, return exactly the same number of lines, \
             don't combine lines, don't remove any lines, don't split lines\n\
             \n\
             ### Input:\n\
             {input}\n\
             \n\
             {marker}\n",
            language = self.target_language,
            input = input,
            marker = TEMPLATE_RESPONSE_MARKER,
        )
    }
}

/// Tokenize every line (with its newline) into one stream and cut it into
/// windows of `chunk_size` tokens. Windows ignore line boundaries.
pub fn chunk_tokens(
    lines: &[String],
    codec: &dyn TokenCodec,
    chunk_size: usize,
) -> Result<Vec<Vec<u32>>> {
    let mut tokens = Vec::new();
    for line in lines {
        tokens.extend(codec.encode(&format!("{}\n", line))?);
    }

    Ok(tokens
        .chunks(chunk_size.max(1))
        .map(<[u32]>::to_vec)
        .collect())
}
