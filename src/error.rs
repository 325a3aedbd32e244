use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM API quota exceeded")]
    QuotaExceeded,

    #[error("Data API error: {0}")]
    DataApi(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InsightsError {
    /// True for failures that mean the model should not be asked again
    /// during this request (no key configured, or quota gone).
    pub fn is_llm_offline(&self) -> bool {
        matches!(self, InsightsError::LlmUnavailable(_) | InsightsError::QuotaExceeded)
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;
