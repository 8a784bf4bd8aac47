// SPDX-License-Identifier: GPL-3.0-only

use camera_session::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Camera capture session controller")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Log state transitions (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Run a preview session
    Preview {
        /// Preview duration in seconds (default: until Ctrl+C)
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Record a video
    Record {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file path (default: ~/Videos/camera-session/video_TIMESTAMP.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug
    let fallback = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    match cli.command {
        Commands::List => cli::list_cameras()?,
        Commands::Preview { seconds } => cli::run_preview(config, seconds)?,
        Commands::Record { duration, output } => cli::record_video(config, duration, output)?,
        Commands::Config => cli::show_config(&config)?,
    }
    Ok(())
}
