use crate::config::LlmConfig;
use crate::error::{InsightsError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One chat-completion call: a system message, a user prompt and whether the
/// model must answer with a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn text(system: &str, prompt: String) -> Self {
        Self { system: system.to_string(), prompt, json_mode: false }
    }

    pub fn json(system: &str, prompt: String) -> Self {
        Self { system: system.to_string(), prompt, json_mode: true }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// False when no live call can succeed (no key, or quota exhausted)
    fn is_available(&self) -> bool {
        true
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_QUOTA: QuotaGuard = QuotaGuard::default();
}

/// Sticky "quota exceeded" switch. Once tripped, every client sharing the
/// guard stops calling the API until the process exits.
#[derive(Debug, Clone, Default)]
pub struct QuotaGuard {
    exceeded: Arc<AtomicBool>,
}

impl QuotaGuard {
    /// The process-wide guard used by the server
    pub fn global() -> Self {
        GLOBAL_QUOTA.clone()
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }

    pub fn trip(&self) {
        if !self.exceeded.swap(true, Ordering::SeqCst) {
            warn!("LLM API quota exceeded; live LLM calls disabled for the rest of this process");
        }
    }
}

/// OpenAI-compatible chat-completion client
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    quota: QuotaGuard,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, quota: QuotaGuard) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InsightsError::Config(format!("Failed to create HTTP client for LLM: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            quota,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": self.temperature,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InsightsError::LlmUnavailable("OPENAI_API_KEY is not set".to_string()))?;

        if self.quota.is_exceeded() {
            return Err(InsightsError::QuotaExceeded);
        }

        debug!("Calling {} (json_mode={})", self.model, request.json_mode);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| InsightsError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            if is_quota_error(status, &error_text) {
                self.quota.trip();
                return Err(InsightsError::QuotaExceeded);
            }
            error!("LLM API error ({}): {}", status, error_text);
            return Err(InsightsError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightsError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && !self.quota.is_exceeded()
    }
}

/// A quota failure is a 429 (or an explicit `insufficient_quota` code) rather
/// than ordinary rate limiting, which clears on its own.
pub fn is_quota_error(status: StatusCode, body: &str) -> bool {
    let lowered = body.to_lowercase();
    if lowered.contains("insufficient_quota") {
        return true;
    }
    status == StatusCode::TOO_MANY_REQUESTS && lowered.contains("quota")
}

fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(InsightsError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| InsightsError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("content_filter") => {
            return Err(InsightsError::Llm("LLM response was filtered by content policy".to_string()))
        }
        Some("length") => warn!("LLM response was truncated due to length limit"),
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| InsightsError::Llm("No content in LLM response".to_string()))?;

    if content.trim().is_empty() {
        return Err(InsightsError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

/// Remove a surrounding markdown code fence (```sql, ```json or bare ```)
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```") {
        // drop the language tag on the opening fence line
        match rest.find('\n') {
            Some(pos) if !rest[..pos].trim().contains(' ') => &rest[pos + 1..],
            Some(_) => rest,
            None => strip_language_tag(rest),
        }
    } else {
        trimmed
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// `sql SELECT 1` -> `SELECT 1` for a fence opened and closed on one line
fn strip_language_tag(line: &str) -> &str {
    for tag in ["sql", "json"] {
        let Some(head) = line.get(..tag.len()) else { continue };
        let rest = &line[tag.len()..];
        if head.eq_ignore_ascii_case(tag) && rest.starts_with(char::is_whitespace) {
            return rest;
        }
    }
    line
}

/// Slice from the first `{` to the last `}`, if any
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays canned answers and records what it was asked
    pub struct ScriptedLlm {
        answers: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
        available: bool,
    }

    impl ScriptedLlm {
        pub fn new(answers: Vec<&str>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().map(|a| Ok(a.to_string())).collect()),
                requests: Mutex::new(Vec::new()),
                available: true,
            }
        }

        pub fn from_results(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
                available: true,
            }
        }

        pub fn failing() -> Self {
            Self::new(vec![])
        }

        pub fn offline() -> Self {
            Self { available: false, ..Self::new(vec![]) }
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if !self.available {
                return Err(InsightsError::LlmUnavailable("scripted offline".to_string()));
            }
            self.requests.lock().unwrap().push(request.clone());
            let next = self.answers.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(InsightsError::Llm("script exhausted".to_string())))
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }
}
