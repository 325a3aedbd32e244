//! Loyalty Agent - question → SQL → execute → insights
//!
//! Each question runs through input validation and then up to three attempts
//! of table selection, SQL generation, SQL validation, execution and result
//! validation. Model or data API failures degrade to keyword routing and
//! canned data instead of failing the request; only an unknown session comes
//! back as `Err`. The schema is read once, when the agent is built.

use crate::agent_prompts;
use crate::chat_history::{ChatHistory, ChatMessage, ContextTurn};
use crate::config::AppConfig;
use crate::error::Result;
use crate::insights::{Analysis, InsightsGenerator};
use crate::llm::{extract_json_object, strip_code_fences, CompletionRequest, LlmClient, LlmProvider, QuotaGuard};
use crate::mock_data::mock_data_for;
use crate::query_executor::{ExecutionOutcome, QueryExecutor};
use crate::response::{DatabaseResults, ErrorKind, QueryResponse, Row};
use crate::schema::{cached_schema, format_schema_for_prompt, DatabaseSchema, Table};
use crate::security::SecurityValidator;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAX_ATTEMPTS: usize = 3;

/// Earlier turns of a session fed into prompts
const CONTEXT_TURNS: usize = 3;

#[derive(Debug, Deserialize)]
struct ValidationAnswer {
    #[serde(default = "default_true")]
    is_valid: bool,
    #[serde(default)]
    needs_retry: bool,
    #[serde(default)]
    error_message: Option<String>,
}

fn default_true() -> bool {
    true
}

enum Verdict {
    Valid,
    Retry(String),
    Invalid(String),
}

pub struct LoyaltyAgent {
    schema: Arc<DatabaseSchema>,
    default_client_id: i64,
    llm: Arc<dyn LlmProvider>,
    executor: QueryExecutor,
    history: ChatHistory,
    security: SecurityValidator,
}

impl LoyaltyAgent {
    pub fn new(config: &AppConfig, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        Ok(Self {
            schema: cached_schema(&config.schema_dir)?,
            default_client_id: config.default_client_id,
            llm,
            executor: QueryExecutor::new(&config.data_api)?,
            history: ChatHistory::new(),
            security: SecurityValidator::new()?,
        })
    }

    /// Agent backed by the OpenAI client and the process-wide quota flag
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = LlmClient::new(&config.llm, QuotaGuard::global())?;
        if config.llm.api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; answers will use canned SQL and analysis");
        }
        Self::new(config, Arc::new(client))
    }

    pub fn get_schema(&self) -> Arc<DatabaseSchema> {
        Arc::clone(&self.schema)
    }

    pub async fn create_session(&self) -> String {
        self.history.create_session().await
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.history.get_history(session_id).await
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<()> {
        self.history.clear_history(session_id).await
    }

    pub async fn process_question(
        &self,
        question: &str,
        session_id: Option<&str>,
        client_id: Option<i64>,
    ) -> Result<QueryResponse> {
        let client_id = client_id.unwrap_or(self.default_client_id);
        info!("Processing question: {}", question);

        let context = match session_id {
            Some(id) => self.history.recent_context(id, CONTEXT_TURNS).await?,
            None => Vec::new(),
        };

        if let Err(failure) = self.security.validate_input(question) {
            let response = QueryResponse::error(failure.kind, &failure.message);
            return self.record(session_id, question, response).await;
        }

        let schema = self.get_schema();
        let mut rejection: Option<String> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            debug!("Attempt {}/{}", attempt, MAX_ATTEMPTS);

            let tables = self.relevant_tables(question, &schema, &context).await;
            let sql = self
                .generate_sql(question, &tables, client_id, &context, rejection.as_deref())
                .await;

            if let Err(failure) = self.security.validate_sql(&sql, client_id) {
                warn!("Attempt {} produced rejected SQL: {}", attempt, failure.message);
                if attempt == MAX_ATTEMPTS {
                    let response = QueryResponse::error(failure.kind, &failure.message);
                    return self.record(session_id, question, response).await;
                }
                rejection = Some(failure.message);
                continue;
            }

            let outcome = self.executor.execute(question, &sql).await;

            match self.validate_results(question, &sql, &outcome.rows).await {
                Verdict::Valid => {}
                Verdict::Retry(reason) => {
                    warn!("Attempt {} results need a retry: {}", attempt, reason);
                    rejection = Some(reason);
                    continue;
                }
                Verdict::Invalid(reason) => {
                    let response = QueryResponse::error(ErrorKind::ValidationError, &reason);
                    return self.record(session_id, question, response).await;
                }
            }

            let analysis = self.analyze(question, &sql, &outcome, &context).await;
            let response = build_response(question, sql, outcome, analysis);
            return self.record(session_id, question, response).await;
        }

        let message = match rejection {
            Some(reason) => format!("Maximum retry attempts exceeded: {}", reason),
            None => "Maximum retry attempts exceeded".to_string(),
        };
        let response = QueryResponse::error(ErrorKind::MaxRetriesExceeded, &message);
        self.record(session_id, question, response).await
    }

    async fn record(&self, session_id: Option<&str>, question: &str, response: QueryResponse) -> Result<QueryResponse> {
        if let Some(id) = session_id {
            self.history.add_message(id, question, response.clone()).await?;
        }
        Ok(response)
    }

    /// Tables chosen by the model, else by keyword, else all of them
    async fn relevant_tables(&self, question: &str, schema: &DatabaseSchema, context: &[ContextTurn]) -> Vec<Table> {
        if self.llm.is_available() {
            let prompt = agent_prompts::relevant_tables_prompt(question, &schema.table_descriptions(), context);
            let request = CompletionRequest::json(agent_prompts::JSON_SYSTEM_PROMPT, prompt);
            match self.llm.complete(&request).await {
                Ok(text) => {
                    let tables = schema.select(&parse_table_names(&text));
                    if !tables.is_empty() {
                        info!(
                            "Relevant tables: {}",
                            tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
                        );
                        return tables;
                    }
                    warn!("Model named no known tables in {:?}", text);
                }
                Err(e) => warn!("Error identifying relevant tables: {}", e),
            }
        }

        let matched: Vec<Table> = schema
            .tables
            .iter()
            .filter(|t| t.mentioned_in(question))
            .cloned()
            .collect();
        if matched.is_empty() {
            debug!("No table keywords in question; using the whole schema");
            schema.tables.clone()
        } else {
            matched
        }
    }

    async fn generate_sql(
        &self,
        question: &str,
        tables: &[Table],
        client_id: i64,
        context: &[ContextTurn],
        rejection: Option<&str>,
    ) -> String {
        if self.llm.is_available() {
            let prompt = agent_prompts::sql_prompt(
                question,
                &format_schema_for_prompt(tables),
                client_id,
                context,
                rejection,
            );
            let request = CompletionRequest::text(agent_prompts::SQL_SYSTEM_PROMPT, prompt);
            match self.llm.complete(&request).await {
                Ok(text) => {
                    let sql = strip_code_fences(&text).trim_end_matches(';').trim();
                    if !sql.is_empty() {
                        info!("Generated SQL: {}", sql);
                        return sql.to_string();
                    }
                    warn!("Model returned an empty SQL query");
                }
                Err(e) => warn!("Error generating SQL: {}", e),
            }
        }

        let dataset = mock_data_for(question, "");
        info!("Using canned SQL for {:?}", dataset);
        dataset.sql(client_id)
    }

    async fn validate_results(&self, question: &str, sql: &str, rows: &[Row]) -> Verdict {
        if !self.llm.is_available() {
            return Verdict::Valid;
        }

        let prompt = agent_prompts::validation_prompt(question, sql, rows);
        let request = CompletionRequest::json(agent_prompts::JSON_SYSTEM_PROMPT, prompt);
        let text = match self.llm.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Response validation skipped: {}", e);
                return Verdict::Valid;
            }
        };

        let answer: ValidationAnswer = match extract_json_object(&text).map(serde_json::from_str) {
            Some(Ok(answer)) => answer,
            _ => {
                warn!("Unreadable validation answer, accepting results: {:?}", text);
                return Verdict::Valid;
            }
        };

        if answer.is_valid {
            return Verdict::Valid;
        }
        let reason = answer
            .error_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Results do not answer the question".to_string());
        if answer.needs_retry {
            Verdict::Retry(reason)
        } else {
            Verdict::Invalid(reason)
        }
    }

    async fn analyze(&self, question: &str, sql: &str, outcome: &ExecutionOutcome, context: &[ContextTurn]) -> Analysis {
        if let Some(dataset) = outcome.mock_dataset() {
            if !self.llm.is_available() {
                return dataset.analysis();
            }
        }

        let (analysis, err) = InsightsGenerator::new(self.llm.as_ref())
            .generate(question, sql, &outcome.rows, context)
            .await;
        match (err, outcome.mock_dataset()) {
            (Some(e), Some(dataset)) if e.is_llm_offline() => dataset.analysis(),
            _ => analysis,
        }
    }
}

/// Table names from `{"tables": [...]}`, or from the first array in the answer
fn parse_table_names(text: &str) -> Vec<String> {
    let value: Value = match extract_json_object(text).map(serde_json::from_str) {
        Some(Ok(value)) => value,
        _ => return Vec::new(),
    };

    let names = value
        .get("tables")
        .and_then(Value::as_array)
        .or_else(|| value.as_object()?.values().find_map(Value::as_array));

    names
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn build_response(question: &str, sql: String, outcome: ExecutionOutcome, analysis: Analysis) -> QueryResponse {
    QueryResponse {
        query_understanding: format!("I'm looking for loyalty program data that answers: '{}'", question),
        sql_query: sql,
        database_results: DatabaseResults {
            count: outcome.count,
            time: outcome.elapsed_secs,
        },
        title: analysis.title,
        data: outcome.rows,
        insights: analysis.insights,
        recommendations: analysis.recommendations,
        error: None,
    }
}
