//! Serve canned loyalty data over the data API protocol

use anyhow::Result;
use clap::Parser;
use loyalty_insights::mock_api::router;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mock_data_api")]
#[command(about = "Serve canned loyalty data over the data API protocol")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 4000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock data API listening on http://{}", addr);

    axum::serve(listener, router()).await?;
    Ok(())
}
