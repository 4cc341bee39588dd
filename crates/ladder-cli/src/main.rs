//! Ladder CLI - quality ladder inspection and headless playback
//!
//! Features:
//! - Quality menu for a content URL
//! - Variant selection preview
//! - Bandwidth probing
//! - Headless playback session with live status output

use clap::{Parser, Subcommand};
use ladder_core::{CatalogClient, JsonCatalogClient, SessionConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Ladder CLI - adaptive quality controller
#[derive(Parser)]
#[command(name = "ladder")]
#[command(version)]
#[command(about = "Inspect quality ladders and drive headless playback sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Session configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the catalog service
    #[arg(long, default_value = "http://localhost:8080/api")]
    api_base: String,

    /// Treat content URLs as HLS master playlists
    #[arg(long)]
    hls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the quality options of a content URL
    Qualities {
        /// Content URL
        url: String,
    },

    /// Show the variants that would be opened
    Select {
        /// Content URL
        url: String,

        /// Requested height (0 = Auto)
        #[arg(long, default_value = "0")]
        height: u32,

        /// Prefer the original audio track
        #[arg(long)]
        force_original_audio: bool,
    },

    /// Estimate bandwidth with a partial download
    Probe {
        /// Stream to download from (defaults to the catalog's mid-ladder video)
        uri: Option<String>,

        /// Content URL whose ladder the estimate is applied to
        #[arg(long)]
        catalog: Option<String>,
    },

    /// Run a playback session against the headless engine
    Play {
        /// Content URL
        url: String,

        /// Initial height (0 = Auto)
        #[arg(long)]
        height: Option<u32>,

        /// Switch to the best height the measured bandwidth allows
        #[arg(long)]
        auto_quality: bool,

        /// How long to play, in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Nominal media length for the headless engine, in seconds
        #[arg(long, default_value = "600")]
        duration: u64,
    },
}

fn catalog_client(cli: &Cli, config: &SessionConfig) -> anyhow::Result<Arc<dyn CatalogClient>> {
    let client: Arc<dyn CatalogClient> = if cli.hls {
        Arc::new(ladder_core::HlsCatalogClient::new(config)?)
    } else {
        Arc::new(JsonCatalogClient::new(&cli.api_base, config)?)
    };
    Ok(client)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    ladder_core::init();

    let config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    let client = catalog_client(&cli, &config)?;

    match &cli.command {
        Commands::Qualities { url } => {
            commands::qualities(client.as_ref(), url, &cli.format).await?;
        }
        Commands::Select { url, height, force_original_audio } => {
            commands::select(client.as_ref(), url, *height, *force_original_audio, &cli.format).await?;
        }
        Commands::Probe { uri, catalog } => {
            commands::probe(
                client.as_ref(),
                &config,
                uri.as_deref(),
                catalog.as_deref(),
                &cli.format,
            )
            .await?;
        }
        Commands::Play { url, height, auto_quality, seconds, duration } => {
            let options = commands::PlayOptions {
                height: *height,
                auto_quality: *auto_quality,
                seconds: *seconds,
                media_duration: *duration,
            };
            commands::play(client, config, url, options, &cli.format).await?;
        }
    }

    Ok(())
}
