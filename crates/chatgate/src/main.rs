// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! chatgate - Rate-limited, deduplicated persistence for captured chat messages.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod ingest;
mod query;

use std::path::PathBuf;
use std::process::ExitCode;

use chatgate_config::ChatgateConfig;
use chatgate_core::GateError;
use clap::{Parser, Subcommand};
use tracing::error;

/// chatgate - Rate-limited, deduplicated persistence for captured chat messages.
#[derive(Parser, Debug)]
#[command(name = "chatgate", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Read JSON-lines messages and run them through the pipeline.
    Ingest {
        /// Input file (defaults to stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print persisted records as JSON lines, most recent first.
    List {
        /// Only records of this conversation name.
        #[arg(long)]
        conversation: Option<String>,
        /// Maximum number of records.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Check whether a message id is persisted. Exits 1 if not.
    Exists {
        /// Message id to look up.
        id: String,
    },
    /// Print the resolved configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let loaded = match &cli.config {
        Some(path) => chatgate_config::load_and_validate_path(path),
        None => chatgate_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            chatgate_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log.level);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("chatgate: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &ChatgateConfig) -> Result<ExitCode, GateError> {
    match command {
        Commands::Ingest { input } => {
            let summary = ingest::run_ingest(config, input.as_deref()).await?;
            let line = serde_json::to_string(&summary)
                .map_err(|e| GateError::Internal(format!("failed to encode summary: {e}")))?;
            println!("{line}");
        }
        Commands::List {
            conversation,
            limit,
        } => {
            query::run_list(config, conversation.as_deref(), limit).await?;
        }
        Commands::Exists { id } => {
            let exists = query::run_exists(config, &id).await?;
            println!("{exists}");
            if !exists {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| GateError::Internal(format!("failed to render config: {e}")))?;
            print!("{rendered}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatgate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
