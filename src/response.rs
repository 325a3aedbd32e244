//! Wire types for `/api/query` and the standardized error responses

use serde::{Deserialize, Serialize};

/// One result row as returned by the data API
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default)]
    pub id: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Email,
    Award,
    #[serde(other)]
    Other,
}

impl Default for RecommendationType {
    fn default() -> Self {
        RecommendationType::Other
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: RecommendationType,
}

impl Recommendation {
    pub fn other(id: u32, title: &str, description: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            description: description.to_string(),
            kind: RecommendationType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatabaseResults {
    pub count: usize,
    /// Seconds spent executing the query
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query_understanding: String,
    pub sql_query: String,
    pub database_results: DatabaseResults,
    pub title: String,
    pub data: Vec<Row>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Failure categories surfaced to the user as a normal response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SecurityViolation,
    ClientIdViolation,
    MissingClientId,
    DangerousOperation,
    MaxRetriesExceeded,
    ValidationError,
    ProcessingError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SecurityViolation => "security_violation",
            ErrorKind::ClientIdViolation => "client_id_violation",
            ErrorKind::MissingClientId => "missing_client_id",
            ErrorKind::DangerousOperation => "dangerous_operation",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ProcessingError => "processing_error",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::SecurityViolation => "Security Check Failed",
            ErrorKind::ClientIdViolation => "Invalid Client ID",
            ErrorKind::MissingClientId => "System Error",
            ErrorKind::DangerousOperation => "Invalid Operation",
            ErrorKind::MaxRetriesExceeded => "Unable to Process",
            ErrorKind::ValidationError | ErrorKind::ProcessingError => "Error",
        }
    }

    /// Text shown to the user; `None` means pass the technical message through
    fn user_message(&self) -> Option<&'static str> {
        match self {
            ErrorKind::SecurityViolation => {
                Some("Your question contains potentially harmful content. Please rephrase.")
            }
            ErrorKind::ClientIdViolation => Some("Client ID cannot be specified in the question."),
            ErrorKind::MissingClientId => Some("Unable to process your request. Please try again."),
            ErrorKind::DangerousOperation => Some("The requested operation is not allowed."),
            ErrorKind::MaxRetriesExceeded => {
                Some("Please rephrase your question to be more specific.")
            }
            ErrorKind::ValidationError | ErrorKind::ProcessingError => None,
        }
    }
}

impl QueryResponse {
    /// Standardized body for a request the pipeline refused or gave up on
    pub fn error(kind: ErrorKind, message: &str) -> Self {
        let text = kind.user_message().unwrap_or(message).to_string();
        Self {
            query_understanding: message.to_string(),
            sql_query: String::new(),
            database_results: DatabaseResults { count: 0, time: 0.0 },
            title: kind.title().to_string(),
            data: Vec::new(),
            insights: vec![Insight { id: 1, text }],
            recommendations: vec![Recommendation::other(
                1,
                "Try Again",
                "Please rephrase your question or try different parameters.",
            )],
            error: Some(ErrorInfo {
                kind: kind.as_str().to_string(),
                message: message.to_string(),
            }),
        }
    }

    /// Body returned with HTTP 500 when the pipeline itself failed
    pub fn internal_failure(message: &str) -> Self {
        Self {
            query_understanding: "There was an error understanding your question.".to_string(),
            sql_query: String::new(),
            database_results: DatabaseResults { count: 0, time: 0.0 },
            title: "Error Processing Query".to_string(),
            data: Vec::new(),
            insights: vec![Insight { id: 1, text: format!("Error: {}", message) }],
            recommendations: vec![Recommendation::other(
                1,
                "Try Again",
                "Please try rephrasing your question or ask something else.",
            )],
            error: Some(ErrorInfo {
                kind: ErrorKind::ProcessingError.as_str().to_string(),
                message: format!("Error processing query: {}", message),
            }),
        }
    }
}
