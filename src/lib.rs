pub mod agent;
pub mod agent_prompts;
pub mod api_server;
pub mod chat_history;
pub mod config;
pub mod error;
pub mod insights;
pub mod llm;
pub mod mock_api;
pub mod mock_data;
pub mod query_executor;
pub mod response;
pub mod schema;
pub mod security;

pub use agent::LoyaltyAgent;
pub use config::AppConfig;
pub use error::{InsightsError, Result};
pub use response::QueryResponse;
