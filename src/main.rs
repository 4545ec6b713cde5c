pub mod types;
pub mod config;
pub mod error;
pub mod source;
pub mod data;
pub mod geometry;
pub mod palette;
pub mod projection;
pub mod basemap;
pub mod render;
pub mod raster;
pub mod view;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the datasets and serve the interactive map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load the datasets and report how counties, regions and geometries line up
    Inspect {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Runs the blocking startup loads off the async runtime.
async fn load_reference(app_config: &config::AppConfig) -> anyhow::Result<types::ReferenceData> {
    let input = app_config.input.clone();
    let map = app_config.map.clone();
    let reference = tokio::task::spawn_blocking(move || data::load_reference_data(&input, &map))
        .await
        .context("Startup load task failed")?
        .context("Failed to load reference data")?;
    Ok(reference)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let reference = load_reference(&app_config).await?;

            server::start_server(app_config, reference).await?;
        }
        Commands::Inspect { config } => {
            info!("Inspecting data with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let reference = load_reference(&app_config).await?;
            let report = data::JoinReport::new(&reference.table, &reference.geometry);

            info!("Statistic columns: {:?}", reference.table.statistic_columns);
            info!(
                "{} rows, {} county geometries, {} matched",
                report.rows, report.features, report.matched
            );
            for county in &report.unmatched_rows {
                info!("Row without geometry: {}", county);
            }
            for county in &report.unmatched_features {
                info!("Geometry without row: {}", county);
            }
            for (region, count) in &report.regions {
                match region {
                    Some(id) => info!("Region {}: {} counties", id, count),
                    None => info!("Unassigned: {} counties", count),
                }
            }
            if let Some(overlay) = &reference.boundaries {
                info!("Boundary overlay: {} lines", overlay.lines.len());
            }
            if let Some(basemap) = &reference.basemap {
                info!("Basemap: {} tiles", basemap.tile_count());
            }
        }
    }

    Ok(())
}
