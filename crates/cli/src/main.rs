//! Session Analyzer CLI
//!
//! A command-line tool for submitting analyses to the analyzer service,
//! checking its health, and replaying recorded landmark tracks offline.

mod client;
mod commands;
mod config;
mod output;

use analyzer_lib::models::Discipline;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{analyze, replay};
use std::path::PathBuf;

/// Session Analyzer CLI
#[derive(Parser)]
#[command(name = "sa")]
#[command(author, version, about = "CLI for the Session Analyzer service", long_about = None)]
pub struct Cli {
    /// Analyzer service URL (can also be set via SA_API_URL env var)
    #[arg(long, env = "SA_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a video for background analysis
    Analyze {
        /// Video locator passed to the service
        #[arg(long)]
        video_url: String,

        /// Session the results are stored under
        #[arg(long)]
        session_id: String,

        /// Discipline (boxing, muay_thai, sparring, grappling)
        #[arg(long)]
        session_type: Option<String>,
    },

    /// Show service liveness, readiness and component health
    Health,

    /// Analyze a recorded landmark track locally
    Replay {
        /// Path to the track JSON file
        track: PathBuf,

        /// Discipline (boxing, muay_thai, sparring, grappling)
        #[arg(long)]
        session_type: Option<String>,

        /// Session ID used for annotation file names
        #[arg(long, default_value = "replay")]
        session_id: String,

        /// Recorded poses below this confidence are treated as missing
        #[arg(long, default_value_t = 0.5)]
        min_confidence: f64,

        /// Write per-frame overlays to this directory
        #[arg(long)]
        annotate_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.format(cli.format);

    match cli.command {
        Commands::Analyze {
            video_url,
            session_id,
            session_type,
        } => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            analyze::submit_analysis(
                &client,
                video_url,
                session_id,
                config.session_type(session_type),
                format,
            )
            .await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            analyze::show_health(&client, format).await?;
        }
        Commands::Replay {
            track,
            session_type,
            session_id,
            min_confidence,
            annotate_dir,
        } => {
            let discipline = match config.session_type(session_type) {
                Some(kind) => kind
                    .parse::<Discipline>()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid --session-type")?,
                None => Discipline::default(),
            };
            let options = replay::ReplayOptions {
                track,
                session_id,
                discipline,
                min_confidence,
                annotate_dir,
            };
            replay::replay(options, format).await?;
        }
    }

    Ok(())
}
