//! Application configuration
//!
//! Read from environment variables (after `.env` has been loaded by the
//! binary). Every field has a default so the server can start with nothing
//! configured and run entirely on mock data.

use crate::error::{InsightsError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CLIENT_ID: i64 = 5252;

/// LLM connection settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Which path the upstream data API exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataApiEndpoint {
    Query,
    ExecuteQuery,
}

impl DataApiEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            DataApiEndpoint::Query => "query",
            DataApiEndpoint::ExecuteQuery => "execute-query",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().trim_start_matches('/').to_lowercase().as_str() {
            "query" => Ok(DataApiEndpoint::Query),
            "execute-query" | "execute_query" => Ok(DataApiEndpoint::ExecuteQuery),
            other => Err(InsightsError::Config(format!(
                "Unknown data API endpoint '{}' (expected 'query' or 'execute-query')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(InsightsError::Config(format!(
                "Unsupported data API method '{}' (expected GET or POST)",
                other
            ))),
        }
    }
}

/// Upstream data API settings
#[derive(Debug, Clone)]
pub struct DataApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: DataApiEndpoint,
    pub method: HttpMethod,
    pub timeout: Duration,
    /// Serve canned rows instead of calling the API
    pub use_mock_data: bool,
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            endpoint: DataApiEndpoint::Query,
            method: HttpMethod::Get,
            timeout: Duration::from_millis(30_000),
            use_mock_data: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub schema_dir: PathBuf,
    pub default_client_id: i64,
    pub llm: LlmConfig,
    pub data_api: DataApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: "http://localhost:5173".to_string(),
            schema_dir: PathBuf::from("schema/yml"),
            default_client_id: DEFAULT_CLIENT_ID,
            llm: LlmConfig::default(),
            data_api: DataApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();

        let port = match get("PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| InsightsError::Config(format!("PORT must be a number, got '{}'", v)))?,
            None => defaults.port,
        };

        let default_client_id = match get("DEFAULT_CLIENT_ID") {
            Some(v) => v.parse().map_err(|_| {
                InsightsError::Config(format!("DEFAULT_CLIENT_ID must be a number, got '{}'", v))
            })?,
            None => defaults.default_client_id,
        };

        let temperature = match get("LLM_TEMPERATURE") {
            Some(v) => v.parse().map_err(|_| {
                InsightsError::Config(format!("LLM_TEMPERATURE must be a number, got '{}'", v))
            })?,
            None => defaults.llm.temperature,
        };

        // API_TIMEOUT is in milliseconds
        let timeout = match get("API_TIMEOUT") {
            Some(v) => Duration::from_millis(v.parse().map_err(|_| {
                InsightsError::Config(format!("API_TIMEOUT must be milliseconds, got '{}'", v))
            })?),
            None => defaults.data_api.timeout,
        };

        let endpoint = match get("DATABASE_API_ENDPOINT") {
            Some(v) => DataApiEndpoint::parse(&v)?,
            None => defaults.data_api.endpoint,
        };

        let method = match get("DATABASE_API_METHOD") {
            Some(v) => HttpMethod::parse(&v)?,
            None => defaults.data_api.method,
        };

        let use_mock_data = get("USE_MOCK_DATA")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.data_api.use_mock_data);

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            cors_origin: get("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            schema_dir: get("SCHEMA_DIR").map(PathBuf::from).unwrap_or(defaults.schema_dir),
            default_client_id,
            llm: LlmConfig {
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.llm.base_url),
                model: get("OPENAI_MODEL").unwrap_or(defaults.llm.model),
                temperature,
                timeout: defaults.llm.timeout,
            },
            data_api: DataApiConfig {
                base_url: get("DATABASE_API_URL").map(|u| u.trim_end_matches('/').to_string()),
                api_key: get("DATABASE_API_KEY"),
                endpoint,
                method,
                timeout,
                use_mock_data,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.default_client_id, 5252);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.llm.api_key.is_none());
        assert!(config.data_api.base_url.is_none());
        assert_eq!(config.data_api.endpoint, DataApiEndpoint::Query);
        assert_eq!(config.data_api.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_reads_data_api_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_API_URL", "https://data.example.com/"),
            ("DATABASE_API_KEY", "secret"),
            ("DATABASE_API_ENDPOINT", "/execute-query"),
            ("DATABASE_API_METHOD", "post"),
            ("API_TIMEOUT", "1500"),
            ("USE_MOCK_DATA", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.data_api.base_url.as_deref(), Some("https://data.example.com"));
        assert_eq!(config.data_api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.data_api.endpoint, DataApiEndpoint::ExecuteQuery);
        assert_eq!(config.data_api.method, HttpMethod::Post);
        assert_eq!(config.data_api.timeout, Duration::from_millis(1500));
        assert!(config.data_api.use_mock_data);
    }

    #[test]
    fn test_blank_api_key_counts_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_rejects_bad_port() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, InsightsError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_endpoint() {
        assert!(DataApiEndpoint::parse("select").is_err());
        assert!(HttpMethod::parse("PATCH").is_err());
    }
}
