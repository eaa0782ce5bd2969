//! Screen OCR Pipeline - screenshot text extraction and evaluation
//!
//! Runs OCR over application screenshots, strips keyboard and status-bar
//! noise from the recognized text, and reconciles the result with
//! human-labelled ground truth.

mod analysis;
mod config;
mod error;
mod ocr;
mod pipeline;
mod sorting;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;
use crate::ocr::CommandRecognizer;
use crate::pipeline::{parse_stages, Pipeline, Stage};

/// Screen OCR Pipeline - keyboard/status-bar filtering and label reconciliation
#[derive(Parser, Debug)]
#[command(name = "screen-ocr-pipeline")]
#[command(about = "Extract screenshot text, filter UI noise, and merge with human labels")]
struct Args {
    /// Configuration file (defaults to config.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline; with no stages or all of 1 2 3, clear OCR data first
    Run {
        /// Stage indices to run in order (1 = OCR, 2 = filter, 3 = merge)
        stages: Vec<u8>,
    },
    /// Run a single stage
    Stage {
        /// Stage index (1 = OCR, 2 = filter, 3 = merge)
        index: u8,
    },
    /// Clear stored OCR data
    Reset,
    /// Write the default configuration
    InitConfig {
        /// Destination (defaults to the user config directory)
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match args.command {
        Command::InitConfig { path } => init_config(path)?,
        Command::Run { stages } => {
            let stages = if stages.is_empty() {
                Stage::ALL.to_vec()
            } else {
                parse_stages(&stages)?
            };
            build_pipeline(args.config.as_deref())?.run_requested(&stages)?;
        }
        Command::Stage { index } => {
            let stage = Stage::try_from(index)?;
            build_pipeline(args.config.as_deref())?.run_stage(stage)?;
        }
        Command::Reset => {
            build_pipeline(args.config.as_deref())?.reset()?;
        }
    }

    Ok(())
}

/// Write the default configuration to `path` or the user config directory
fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => storage::get_config_dir()?.join("config.toml"),
    };
    config::save_config(&PipelineConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Pipeline for the loaded configuration, with OCR when a command is set
fn build_pipeline(config_path: Option<&Path>) -> Result<Pipeline> {
    let config = load_or_default_config(config_path)?;
    let recognizer = CommandRecognizer::from_settings(&config.ocr);

    let pipeline = Pipeline::new(config);
    Ok(match recognizer {
        Some(recognizer) => pipeline.with_recognizer(Box::new(recognizer)),
        None => pipeline,
    })
}

/// Load configuration from the given file, the user config directory, or defaults
fn load_or_default_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path).with_context(|| format!("Failed to load {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        }
    }

    info!("Using default configuration");
    Ok(PipelineConfig::default())
}
