//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::PathBuf;

use crate::core::config::{ServerConfig, DEFAULT_PORT};
use crate::core::models::{LoadStrategy, PromptStyle};
use crate::processors::srt::DEFAULT_BATCH_LINES;

/// Commands for the subtitle translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the model and serve the HTTP API
    Serve {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// TOML, YAML or JSON configuration file (default: environment)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the load strategy (memory or quantized)
        #[arg(long)]
        load_strategy: Option<LoadStrategy>,

        /// Override the prompt style (chunked or template)
        #[arg(long)]
        prompt_style: Option<PromptStyle>,

        /// Run on CPU even when an accelerator is available
        #[arg(long)]
        cpu: bool,
    },

    /// Translate .srt files through a running server
    Translate {
        /// Subtitle file or directory
        #[arg(short, long)]
        path: PathBuf,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:45313")]
        endpoint: String,

        /// Language alias used in output file names
        #[arg(short, long, default_value = "es")]
        target: String,

        /// Cues sent per request
        #[arg(long, default_value_t = DEFAULT_BATCH_LINES)]
        batch_lines: usize,

        /// Replace existing translations
        #[arg(long)]
        overwrite: bool,
    },
}

/// Handle serve command
pub async fn handle_serve(
    host: String,
    port: u16,
    config: Option<PathBuf>,
    load_strategy: Option<LoadStrategy>,
    prompt_style: Option<PromptStyle>,
    cpu: bool,
) -> anyhow::Result<()> {
    use crate::core::config::TranslatorConfig;
    use crate::core::translator::Translator;
    use crate::server::api::run_server;
    use tracing::info;

    let mut translator_config = TranslatorConfig::load(config.as_deref())?;
    if let Some(strategy) = load_strategy {
        translator_config.load_strategy = strategy;
    }
    if let Some(style) = prompt_style {
        translator_config.prompt_style = style;
    }
    translator_config.force_cpu |= cpu;

    info!(
        "Loading model {} ({})",
        translator_config.model_id, translator_config.load_strategy
    );

    // Hub downloads and weight mapping block
    let translator = tokio::task::spawn_blocking(move || Translator::load(translator_config)).await??;

    let server_config = ServerConfig::new(host, port);
    println!("🚀 Server starting on http://{}", server_config.addr());
    println!("📄 OpenAPI: http://{}/api-docs/openapi.json", server_config.addr());

    run_server(server_config, translator).await?;

    Ok(())
}

/// Handle translate command
pub async fn handle_translate(
    path: PathBuf,
    recursive: bool,
    endpoint: String,
    target: String,
    batch_lines: usize,
    overwrite: bool,
) -> anyhow::Result<()> {
    use crate::processors::srt::{FileOutcome, SubtitleProcessor};
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;
    use tracing::info;

    let start_time = Instant::now();

    info!("Starting subtitle translation");
    info!("Input: {}", path.display());
    info!("Server: {}", endpoint);
    info!("Target alias: {}", target);

    let processor = SubtitleProcessor::new(endpoint, target, batch_lines, overwrite)?;

    let files = if path.is_dir() {
        processor.find_files(&path, recursive)?
    } else {
        vec![path]
    };

    if files.is_empty() {
        anyhow::bail!("No subtitle files found");
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=>-"),
    );

    let mut translated = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for file_path in files {
        pb.set_message(format!("Processing: {}", file_path.display()));

        match processor.translate_file(&file_path).await {
            Ok(FileOutcome::Translated(_)) => translated += 1,
            Ok(FileOutcome::Skipped(_)) => skipped += 1,
            Err(e) => {
                failed += 1;
                pb.println(format!("Error processing {}: {}", file_path.display(), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Completed");

    let duration = start_time.elapsed();
    info!(
        "Completed: {} translated, {} skipped, {} failed in {:?}",
        translated, skipped, failed, duration
    );

    println!("\n✅ Translation completed!");
    println!("   Translated: {}", translated);
    println!("   Skipped: {}", skipped);
    println!("   Failed: {}", failed);
    println!("   Time: {:?}", duration);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed", failed);
    }

    Ok(())
}
