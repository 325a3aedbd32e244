//! In-memory chat sessions
//!
//! Sessions live for the lifetime of the process. Each stored turn keeps the
//! full response so follow-up questions can be grounded in earlier SQL.

use crate::error::{InsightsError, Result};
use crate::response::QueryResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub response: QueryResponse,
}

/// Compact view of an earlier turn, as fed into prompts
#[derive(Debug, Clone, PartialEq)]
pub struct ContextTurn {
    pub question: String,
    pub understanding: String,
    pub sql_query: String,
    pub title: String,
}

impl From<&ChatMessage> for ContextTurn {
    fn from(message: &ChatMessage) -> Self {
        Self {
            question: message.question.clone(),
            understanding: message.response.query_understanding.clone(),
            sql_query: message.response.sql_query.clone(),
            title: message.response.title.clone(),
        }
    }
}

#[derive(Default)]
pub struct ChatHistory {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(session_id.clone(), Vec::new());
        session_id
    }

    pub async fn add_message(&self, session_id: &str, question: &str, response: QueryResponse) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let history = sessions
            .get_mut(session_id)
            .ok_or_else(|| InsightsError::SessionNotFound(session_id.to_string()))?;
        history.push(ChatMessage {
            timestamp: Utc::now(),
            question: question.to_string(),
            response,
        });
        Ok(())
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| InsightsError::SessionNotFound(session_id.to_string()))
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let history = sessions
            .get_mut(session_id)
            .ok_or_else(|| InsightsError::SessionNotFound(session_id.to_string()))?;
        history.clear();
        Ok(())
    }

    /// The last `limit` turns of a session, oldest first
    pub async fn recent_context(&self, session_id: &str, limit: usize) -> Result<Vec<ContextTurn>> {
        let sessions = self.sessions.read().await;
        let history = sessions
            .get(session_id)
            .ok_or_else(|| InsightsError::SessionNotFound(session_id.to_string()))?;
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).map(ContextTurn::from).collect())
    }
}
