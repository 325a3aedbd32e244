//! HTTP server for the loyalty insights API

use anyhow::{Context, Result};
use clap::Parser;
use loyalty_insights::api_server::{start_server, ApiState};
use loyalty_insights::{AppConfig, LoyaltyAgent};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Loyalty insights API server")]
struct Args {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory of table YAML files (overrides SCHEMA_DIR)
    #[arg(short, long)]
    schema_dir: Option<PathBuf>,

    /// Serve mock data instead of calling the data API
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.schema_dir {
        config.schema_dir = dir;
    }
    if args.mock {
        config.data_api.use_mock_data = true;
    }

    match &config.data_api.base_url {
        Some(url) if !config.data_api.use_mock_data => info!("Data API: {}", url),
        _ => warn!("Serving mock data; set DATABASE_API_URL to query a live data API"),
    }

    let agent = LoyaltyAgent::from_config(&config)
        .with_context(|| format!("failed to load schema from {}", config.schema_dir.display()))?;
    info!("Loaded {} tables from {}", agent.get_schema().tables.len(), config.schema_dir.display());

    start_server(&config, ApiState::new(agent)).await?;
    Ok(())
}
