//! Layout Command Line Interface
//!
//! # Usage
//!
//! ```bash
//! # Check a layout against the hard rules (baseline defaults to the layout itself)
//! layout_cli validate room.json
//! layout_cli validate candidate.json --baseline room.json
//!
//! # Generate variations (GEMINI_API_KEY must be set)
//! layout_cli propose room.json --lock bed_1
//!
//! # Extract a layout from a photo (Gemini vision)
//! layout_cli extract photo.jpg > room.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use layout_pipeline::client_factory::reasoning_client_from_env;
use layout_pipeline::gemini_client::GeminiClient;
use layout_pipeline::{generate_variations, ConstraintEngine, Extractor, Layout, PipelineConfig, RoomImage};

#[derive(Parser)]
#[command(name = "layout_cli")]
#[command(version)]
#[command(about = "Validate, generate and extract floor-plan layouts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the violation list of a layout as JSON
    Validate {
        /// Layout JSON file
        layout: PathBuf,

        /// Baseline used for structural checks
        #[arg(long)]
        baseline: Option<PathBuf>,
    },

    /// Run the generation stage and print the surviving variations
    Propose {
        /// Baseline layout JSON file
        layout: PathBuf,

        /// Object ids that must not move
        #[arg(long = "lock")]
        locked: Vec<String>,
    },

    /// Extract a layout from a room photo
    Extract {
        /// Image file (png or jpeg)
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate { layout, baseline } => cmd_validate(&layout, baseline.as_deref()),
        Commands::Propose { layout, locked } => cmd_propose(&layout, &locked).await,
        Commands::Extract { image } => cmd_extract(&image).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn read_layout(path: &Path) -> Result<Layout> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid layout in '{}'", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_validate(layout: &Path, baseline: Option<&Path>) -> Result<()> {
    let candidate = read_layout(layout)?;
    let baseline = match baseline {
        Some(path) => read_layout(path)?,
        None => candidate.clone(),
    };
    let config = PipelineConfig::from_env();
    let engine = ConstraintEngine::new(config.rules, Arc::new(baseline));
    print_json(&engine.validate(&candidate))
}

async fn cmd_propose(layout: &Path, locked: &[String]) -> Result<()> {
    let baseline = read_layout(layout)?;
    let client = reasoning_client_from_env()?;
    let config = PipelineConfig::from_env();
    let variations = generate_variations(&config, client, Arc::new(baseline), locked).await?;
    print_json(&variations)
}

async fn cmd_extract(image: &Path) -> Result<()> {
    let data = std::fs::read(image).with_context(|| format!("Failed to read '{}'", image.display()))?;
    let mime_type = match image.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };
    let extractor = GeminiClient::from_env()?;
    let layout = extractor.extract(&RoomImage::new(mime_type, data)).await?;
    print_json(&layout)
}
