//! SubRip subtitle processor that drives a running translation server

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::errors::{Result, TranslationError};

/// Default number of cues sent per request
pub const DEFAULT_BATCH_LINES: usize = 100;

const CUE_PATTERN: &str = r"(\d+\r?\n[^\r\n]* --> [^\r\n]*\r?\n)((?:[^\r\n]+\r?\n)+)";
const TAG_TEXT_PATTERN: &str = r">([^<]+)<";
const OVERRIDE_PATTERN: &str = r"\{[^}]+\}";

/// One subtitle cue: index and timing header plus single-line text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    /// `index\nstart --> end\n`, line endings preserved
    pub header: String,
    pub text: String,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TranslationError::InternalError(e.to_string()))
}

/// Parse cues out of SRT content.
///
/// Markup-bearing text keeps only the text between tags, line breaks inside
/// a cue become spaces and `{...}` override tags are dropped.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleEntry>> {
    let cue = compile(CUE_PATTERN)?;
    let tag_text = compile(TAG_TEXT_PATTERN)?;
    let overrides = compile(OVERRIDE_PATTERN)?;

    // The last cue only matches when terminated by a line break
    let mut content = content.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }

    let entries = cue
        .captures_iter(&content)
        .map(|caps| {
            let raw = caps[2].trim();
            let mut text = tag_text
                .captures_iter(raw)
                .map(|m| m[1].trim().to_string())
                .filter(|piece| !piece.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() && !raw.starts_with('<') {
                text = raw.to_string();
            }

            let text = text.replace("\r\n", " ").replace('\n', " ");
            SubtitleEntry {
                header: caps[1].to_string(),
                text: overrides.replace_all(&text, "").into_owned(),
            }
        })
        .collect();

    Ok(entries)
}

/// Rebuild an SRT document with one translated line per cue
pub fn render_srt(entries: &[SubtitleEntry], translations: &[String]) -> Result<String> {
    if entries.len() != translations.len() {
        return Err(TranslationError::InvalidResponseError {
            message: format!(
                "{} cues but {} translated lines",
                entries.len(),
                translations.len()
            ),
        });
    }

    let mut rendered = entries
        .iter()
        .zip(translations)
        .map(|(entry, line)| format!("{}{}", entry.header, line))
        .collect::<Vec<_>>()
        .join("\n\n");
    rendered.push('\n');
    Ok(rendered)
}

/// `name.en.srt` or `name.srt` becomes `name.<alias>.srt`
pub fn output_path(input: &Path, alias: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".en.srt")
        .or_else(|| name.strip_suffix(".srt"))
        .unwrap_or(&name);
    input.with_file_name(format!("{}.{}.srt", stem, alias))
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Translated(PathBuf),
    /// A translation already existed at this path
    Skipped(PathBuf),
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    text: &'a [String],
}

#[derive(Deserialize)]
struct TranslateReply {
    translated_text: String,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

/// Translates `.srt` files by posting cue batches to `POST /translate`
#[derive(Debug, Clone)]
pub struct SubtitleProcessor {
    client: reqwest::Client,
    endpoint: String,
    target_alias: String,
    batch_lines: usize,
    overwrite: bool,
}

impl SubtitleProcessor {
    /// Create a processor for the server at `endpoint` (e.g. `http://127.0.0.1:45313`)
    pub fn new(
        endpoint: impl Into<String>,
        target_alias: impl Into<String>,
        batch_lines: usize,
        overwrite: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            target_alias: target_alias.into(),
            batch_lines: batch_lines.max(1),
            overwrite,
        })
    }

    /// Find source subtitle files in a directory
    pub fn find_files(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(TranslationError::FileError {
                path: dir.display().to_string(),
                message: "Not a directory".to_string(),
            });
        }

        let depth = if recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .max_depth(depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| path.is_file() && self.is_source_file(path))
            .collect();
        files.sort();

        Ok(files)
    }

    /// `.srt` files that are not themselves translations
    fn is_source_file(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        let translated_suffix = format!(".{}.srt", self.target_alias.to_lowercase());
        name.ends_with(".srt") && !name.ends_with(&translated_suffix)
    }

    /// Send one batch of lines and split the answer back into lines
    pub async fn translate_lines(&self, lines: &[String]) -> Result<Vec<String>> {
        let url = format!("{}/translate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&TranslateBody { text: lines })
            .send()
            .await
            .map_err(|e| TranslationError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorReply>(&body)
                .map(|reply| reply.error)
                .unwrap_or(body);
            return Err(TranslationError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let reply: TranslateReply =
            response
                .json()
                .await
                .map_err(|e| TranslationError::InvalidResponseError {
                    message: e.to_string(),
                })?;

        let translated: Vec<String> = reply
            .translated_text
            .split('\n')
            .map(|line| line.trim().to_string())
            .collect();

        if translated.len() != lines.len() {
            return Err(TranslationError::InvalidResponseError {
                message: format!(
                    "sent {} lines, received {}",
                    lines.len(),
                    translated.len()
                ),
            });
        }

        Ok(translated)
    }

    /// Translate one subtitle file next to its source
    pub async fn translate_file(&self, input: &Path) -> Result<FileOutcome> {
        let output = output_path(input, &self.target_alias);
        if output.exists() && !self.overwrite {
            info!("Skipping, existing translation: {}", output.display());
            return Ok(FileOutcome::Skipped(output));
        }

        let content = tokio::fs::read_to_string(input)
            .await
            .map_err(|e| TranslationError::FileError {
                path: input.display().to_string(),
                message: e.to_string(),
            })?;

        let entries = parse_srt(&content)?;
        if entries.is_empty() {
            return Err(TranslationError::FileError {
                path: input.display().to_string(),
                message: "no subtitle cues found".to_string(),
            });
        }

        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let batches = texts.len().div_ceil(self.batch_lines);
        let mut translations = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(self.batch_lines).enumerate() {
            debug!(
                "{}: batch {}/{} ({} lines)",
                input.display(),
                index + 1,
                batches,
                batch.len()
            );
            translations.extend(self.translate_lines(batch).await?);
        }

        let rendered = render_srt(&entries, &translations)?;
        tokio::fs::write(&output, rendered)
            .await
            .map_err(|e| TranslationError::FileError {
                path: output.display().to_string(),
                message: e.to_string(),
            })?;

        info!("Translated: {} -> {}", input.display(), output.display());
        Ok(FileOutcome::Translated(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TranslatorConfig;
    use crate::core::translator::Translator;
    use crate::server::api::{router, AppState};
    use crate::testing::{CharCodec, EchoGenerator};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello there\n\n\
                          2\n00:00:03,000 --> 00:00:04,000\n<i>How are</i>\n<i>you?</i>\n\n\
                          3\n00:00:05,000 --> 00:00:06,000\n{\\an8}Fine\n";

    #[test]
    fn test_parse_srt() {
        let entries = parse_srt(SAMPLE).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].header, "1\n00:00:01,000 --> 00:00:02,000\n");
        assert_eq!(entries[0].text, "Hello there");
        assert_eq!(entries[1].text, "How are you?");
        assert_eq!(entries[2].text, "Fine");
    }

    #[test]
    fn test_parse_srt_multiline_and_crlf() {
        let content = "1\r\n00:00:01,000 --> 00:00:02,000\r\nFirst line\r\nsecond line\r\n\r\n\
                       2\r\n00:00:03,000 --> 00:00:04,000\r\nNext\r\n";
        let entries = parse_srt(content).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].text, "Next");
        assert_eq!(entries[0].header, "1\r\n00:00:01,000 --> 00:00:02,000\r\n");
        assert_eq!(entries[0].text, "First line second line");
    }

    #[test]
    fn test_parse_srt_tag_only_cue_is_empty() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\n<b></b>\n";
        let entries = parse_srt(content).unwrap();
        assert_eq!(entries[0].text, "");
    }

    #[test]
    fn test_render_srt() {
        let entries = parse_srt(SAMPLE).unwrap();
        let translations = vec!["Hola".to_string(), "¿Cómo estás?".to_string(), "Bien".to_string()];

        let rendered = render_srt(&entries, &translations).unwrap();
        assert_eq!(
            rendered,
            "1\n00:00:01,000 --> 00:00:02,000\nHola\n\n\
             2\n00:00:03,000 --> 00:00:04,000\n¿Cómo estás?\n\n\
             3\n00:00:05,000 --> 00:00:06,000\nBien\n"
        );
        assert_eq!(parse_srt(&rendered).unwrap().len(), 3);
    }

    #[test]
    fn test_render_srt_count_mismatch() {
        let entries = parse_srt(SAMPLE).unwrap();
        let result = render_srt(&entries, &["Hola".to_string()]);
        assert!(matches!(result, Err(TranslationError::InvalidResponseError { .. })));
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("/media/Movie (2020).en.srt"), "es"),
            PathBuf::from("/media/Movie (2020).es.srt")
        );
        assert_eq!(
            output_path(Path::new("show/ep01.srt"), "es"),
            PathBuf::from("show/ep01.es.srt")
        );
    }

    #[test]
    fn test_find_files_skips_translations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.en.srt"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("a.es.srt"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("season1")).unwrap();
        std::fs::write(dir.path().join("season1/b.srt"), SAMPLE).unwrap();

        let processor = SubtitleProcessor::new("http://127.0.0.1:1", "es", 100, false).unwrap();

        let flat = processor.find_files(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.en.srt")]);

        let nested = processor.find_files(dir.path(), true).unwrap();
        assert_eq!(
            nested,
            vec![dir.path().join("a.en.srt"), dir.path().join("season1/b.srt")]
        );
    }

    #[tokio::test]
    async fn test_existing_translation_skipped() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("movie.en.srt");
        let existing = dir.path().join("movie.es.srt");
        std::fs::write(&input, SAMPLE).unwrap();
        std::fs::write(&existing, "kept").unwrap();

        // Nothing listens on this endpoint, so any request would fail
        let processor = SubtitleProcessor::new("http://127.0.0.1:1", "es", 100, false).unwrap();
        let outcome = processor.translate_file(&input).await.unwrap();

        assert_eq!(outcome, FileOutcome::Skipped(existing.clone()));
        assert_eq!(std::fs::read_to_string(existing).unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_translate_file_against_server() {
        let config = TranslatorConfig {
            stream_output: false,
            retry_delay_ms: 0,
            ..Default::default()
        };
        let translator =
            Translator::new(config, Box::new(EchoGenerator::new()), Arc::new(CharCodec)).unwrap();
        let app = router(Arc::new(AppState::new(translator)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("movie.en.srt");
        std::fs::write(&input, SAMPLE).unwrap();

        // Two cues per request exercises batching
        let processor =
            SubtitleProcessor::new(format!("http://{}", addr), "es", 2, false).unwrap();
        let outcome = processor.translate_file(&input).await.unwrap();

        let output = dir.path().join("movie.es.srt");
        assert_eq!(outcome, FileOutcome::Translated(output.clone()));

        let written = std::fs::read_to_string(output).unwrap();
        let entries = parse_srt(&written).unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello there", "How are you?", "Fine"]);
    }
}
