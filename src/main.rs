use anyhow::Result;
use clap::Parser;
use loyalty_insights::{AppConfig, LoyaltyAgent};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loyalty-insights")]
#[command(about = "Ask a question about your loyalty program data")]
struct Args {
    /// The question in natural language
    question: String,

    /// Directory of table YAML files (default: SCHEMA_DIR or schema/yml)
    #[arg(short, long)]
    schema_dir: Option<PathBuf>,

    /// Tenant to query for (default: DEFAULT_CLIENT_ID or 5252)
    #[arg(short, long)]
    client_id: Option<i64>,

    /// Answer from mock data instead of the data API
    #[arg(long)]
    mock: bool,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = args.schema_dir {
        config.schema_dir = dir;
    }
    if args.mock {
        config.data_api.use_mock_data = true;
    }
    if args.api_key.is_some() {
        config.llm.api_key = args.api_key;
    }

    info!("Question: {}", args.question);
    let agent = LoyaltyAgent::from_config(&config)?;
    let response = agent.process_question(&args.question, None, args.client_id).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
