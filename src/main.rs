//! CityPulse ETL command-line entry point

use anyhow::{Context, Result};
use citypulse_etl::config::Config;
use citypulse_etl::types::{DatasetDescriptor, MetadataDescriptor};
use citypulse_etl::{db, metadata, pipeline};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "citypulse-etl", about = "Run the CityPulse ETL pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drop and recreate every database table
    CleanDb,

    /// Download metadata files and load the sensor/garage reference tables
    InitMetadata {
        /// JSON file of metadata descriptors: [{"name", "url"}, ...]
        #[arg(long)]
        metadata_json: PathBuf,
    },

    /// Clear the raw data directory
    CleanRawFiles,

    /// Run the ETL pipeline for a list of datasets
    RunPipeline {
        /// JSON file of dataset descriptors:
        /// [{"name", "url", "type", "location"}, ...]
        #[arg(long)]
        dataset_json: PathBuf,

        /// Reuse already-downloaded files
        #[arg(long, default_value_t = false)]
        skip_download: bool,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("cannot read descriptor file {path:?}"))?;
    serde_json::from_str(&body).with_context(|| format!("malformed descriptor file {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.ensure_raw_data_dir()?;

    match cli.command {
        Command::CleanDb => {
            let pool = db::connect(&config).await?;
            db::clear(&pool).await?;
            db::init(&pool).await?;
        }
        Command::InitMetadata { metadata_json } => {
            let pool = db::connect(&config).await?;
            let descriptors: Vec<MetadataDescriptor> = read_json(&metadata_json)?;
            for desc in &descriptors {
                info!("Initialising metadata: {}", desc.name);
                metadata::initialise_metadata(&pool, &config, desc).await?;
            }
            info!("Metadata initialised");
        }
        Command::CleanRawFiles => {
            config.clear_raw_data_dir()?;
            info!("Raw data cleared");
        }
        Command::RunPipeline {
            dataset_json,
            skip_download,
        } => {
            let pool = db::connect(&config).await?;
            let descriptors: Vec<DatasetDescriptor> = read_json(&dataset_json)?;
            info!("Running pipeline for {} dataset(s)", descriptors.len());
            pipeline::run_pipelines(&pool, &config, &descriptors, skip_download).await?;
        }
    }

    Ok(())
}
