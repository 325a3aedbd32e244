//! Input and SQL security checks
//!
//! Questions may not name a tenant or carry SQL-injection fragments, and
//! generated SQL must be read-only and filtered by the caller's client id.

use crate::error::{InsightsError, Result};
use crate::response::ErrorKind;
use regex::Regex;
use tracing::{debug, warn};

const DANGEROUS_PATTERNS: &[&str] = &[
    r"\bDROP\b",
    r"\bDELETE\b",
    r"\bUPDATE\b",
    r"\bINSERT\b",
    r"\bTRUNCATE\b",
    r"\bALTER\b",
    r"\bEXEC\b",
    r"\bEXECUTE\b",
    r"\bUNION\b",
    r"--",
    r"/\*.*?\*/",
    r";.*?;",
    r"@@",
    r"0x[0-9a-fA-F]+",
    r"WAITFOR\s+DELAY",
    r"BENCHMARK\s*\(",
    r"SLEEP\s*\(",
    r"pg_sleep\s*\(",
];

/// Why a question or query was refused
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityCheckFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl SecurityCheckFailure {
    fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

pub type SecurityCheck = std::result::Result<(), SecurityCheckFailure>;

/// `client_id = <id>`, optionally quoted, with any spacing and any table prefix
const CLIENT_FILTER_PATTERN: &str = r#"(?i)\bclient_id\s*=\s*(?:'(-?\d+)'|"(-?\d+)"|(-?\d+)\b)"#;

pub struct SecurityValidator {
    dangerous: Regex,
    client_filter: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| InsightsError::Config(format!("invalid security pattern: {}", e)))
}

impl SecurityValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dangerous: compile(&format!("(?is){}", DANGEROUS_PATTERNS.join("|")))?,
            client_filter: compile(CLIENT_FILTER_PATTERN)?,
        })
    }

    pub fn validate_input(&self, question: &str) -> SecurityCheck {
        if question.to_lowercase().contains("client_id") {
            warn!("Rejected question referencing client_id");
            return Err(SecurityCheckFailure::new(
                ErrorKind::ClientIdViolation,
                "Client ID cannot be specified in the question",
            ));
        }

        if let Some(m) = self.dangerous.find(question) {
            warn!("Rejected question with harmful fragment {:?}", m.as_str());
            return Err(SecurityCheckFailure::new(
                ErrorKind::SecurityViolation,
                "Question contains potentially harmful content",
            ));
        }

        debug!("Input security validation passed");
        Ok(())
    }

    pub fn validate_sql(&self, sql: &str, client_id: i64) -> SecurityCheck {
        if !self.has_client_filter(sql, client_id) {
            warn!("SQL query missing client_id filter: {}", sql);
            return Err(SecurityCheckFailure::new(
                ErrorKind::MissingClientId,
                "Query must filter by client_id",
            ));
        }

        if let Some(m) = self.dangerous.find(sql) {
            warn!("SQL query contains harmful fragment {:?}", m.as_str());
            return Err(SecurityCheckFailure::new(
                ErrorKind::DangerousOperation,
                "Query contains potentially harmful operations",
            ));
        }

        debug!("SQL security validation passed");
        Ok(())
    }

    fn has_client_filter(&self, sql: &str, client_id: i64) -> bool {
        self.client_filter.captures_iter(sql).any(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .any(|id| id.as_str().parse::<i64>() == Ok(client_id))
        })
    }
}
