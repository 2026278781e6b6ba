//! Main entry point for the SRT Translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use srt_translator::cli::commands::{self, Commands};

/// SRT Translator - subtitle translation on a local language model
#[derive(Parser, Debug)]
#[command(name = "srt-translator", version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn main() -> anyhow::Result<()> {
    // Process environment is only written before worker threads exist
    std::env::set_var("TOKENIZERS_PARALLELISM", "false");
    dotenv().ok();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("srt_translator={},tower_http={}", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Some(Commands::Serve {
            host,
            port,
            config,
            load_strategy,
            prompt_style,
            cpu,
        }) => {
            commands::handle_serve(host, port, config, load_strategy, prompt_style, cpu).await?;
        }
        Some(Commands::Translate {
            path,
            recursive,
            endpoint,
            target,
            batch_lines,
            overwrite,
        }) => {
            commands::handle_translate(path, recursive, endpoint, target, batch_lines, overwrite)
                .await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
