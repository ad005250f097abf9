//! `shortsmith` CLI - make vertical, captioned shorts from long videos

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shortsmith")]
#[command(about = "Turn long videos into cropped, captioned 9:16 shorts")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/shortsmith/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (GET /make-short?link=&start=&end=)
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Make one short and print the result as JSON
    Make {
        /// Video reference (URL or local path)
        link: String,
        /// Trim start (HH:MM:SS, MM:SS or seconds)
        start: String,
        /// Trim end (HH:MM:SS, MM:SS or seconds)
        end: String,
    },

    /// Print the 9:16 crop window for a frame size
    Crop {
        /// Source width in pixels
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        width: u32,
        /// Source height in pixels
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        height: u32,
    },

    /// Print caption intervals for a transcript JSON file
    Align {
        /// Transcript file: `{"text": .., "words": [..]}` or a bare word array
        transcript: PathBuf,

        /// Caption delay in seconds
        #[arg(short, long)]
        delay: Option<f64>,

        /// Caption color
        #[arg(long, default_value = "white")]
        color: String,

        /// Caption font
        #[arg(long, default_value = "Impact")]
        font: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shortsmith={default_level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { bind } => {
            cmd::cmd_serve(config_path, bind).await?;
        }
        Commands::Make { link, start, end } => {
            cmd::cmd_make(config_path, &link, &start, &end).await?;
        }
        Commands::Crop { width, height } => {
            cmd::cmd_crop(width, height)?;
        }
        Commands::Align {
            transcript,
            delay,
            color,
            font,
        } => {
            cmd::cmd_align(config_path, &transcript, delay, &color, &font)?;
        }
        Commands::Config => {
            cmd::cmd_config(config_path)?;
        }
    }

    Ok(())
}
