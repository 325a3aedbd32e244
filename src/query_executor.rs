//! Query Executor - runs generated SQL against the upstream data API
//!
//! The data API is whatever the deployment points `DATABASE_API_URL` at. It
//! answers either `{results, count, time}` or bare JSON, so responses are
//! normalized into rows here. Any failure falls back to canned rows.

use crate::config::{DataApiConfig, HttpMethod};
use crate::error::{InsightsError, Result};
use crate::mock_data::{mock_data_for, MockDataset};
use crate::response::Row;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the rows of an execution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Live,
    Mock(MockDataset),
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub rows: Vec<Row>,
    pub count: usize,
    pub elapsed_secs: f64,
    pub source: DataSource,
}

impl ExecutionOutcome {
    pub fn mock_dataset(&self) -> Option<MockDataset> {
        match self.source {
            DataSource::Mock(dataset) => Some(dataset),
            DataSource::Live => None,
        }
    }
}

/// Data API answer reduced to rows
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub rows: Vec<Row>,
    pub count: usize,
    /// Execution time reported by the API, in seconds
    pub time: Option<f64>,
}

fn value_row(value: Value) -> Row {
    let mut row = Row::new();
    row.insert("value".to_string(), value);
    row
}

fn rows_from_array(items: Vec<Value>) -> Vec<Row> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => row,
            other => value_row(other),
        })
        .collect()
}

/// Accepts `{results, count, time}`, a row array, a single object or a scalar
pub fn normalize_response(body: Value) -> NormalizedResult {
    match body {
        Value::Object(mut object) if matches!(object.get("results"), Some(Value::Array(_))) => {
            let rows = match object.remove("results") {
                Some(Value::Array(items)) => rows_from_array(items),
                _ => Vec::new(),
            };
            let count = object
                .get("count")
                .and_then(Value::as_u64)
                .map(|c| c as usize)
                .unwrap_or(rows.len());
            let time = object.get("time").and_then(Value::as_f64);
            NormalizedResult { rows, count, time }
        }
        Value::Object(object) => NormalizedResult {
            rows: vec![object],
            count: 1,
            time: None,
        },
        Value::Array(items) => {
            let rows = rows_from_array(items);
            NormalizedResult { count: rows.len(), rows, time: None }
        }
        Value::Null => NormalizedResult {
            rows: Vec::new(),
            count: 0,
            time: None,
        },
        scalar => NormalizedResult {
            rows: vec![value_row(scalar)],
            count: 1,
            time: None,
        },
    }
}

/// HTTP client for the upstream data API
pub struct DataApiClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    method: HttpMethod,
}

impl DataApiClient {
    pub fn new(base_url: &str, config: &DataApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("Loyalty-Insights-Agent/1.0")
            .build()
            .map_err(|e| InsightsError::Config(format!("Failed to create HTTP client for data API: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/{}", base_url.trim_end_matches('/'), config.endpoint.path()),
            api_key: config.api_key.clone(),
            method: config.method,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(&self, sql: &str) -> Result<NormalizedResult> {
        let request = match self.method {
            HttpMethod::Get => self.client.get(&self.url).query(&[("query", sql)]),
            HttpMethod::Post => self.client.post(&self.url).json(&serde_json::json!({ "query": sql })),
        };
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        debug!("Sending query to {}", self.url);
        let response = request
            .send()
            .await
            .map_err(|e| InsightsError::DataApi(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InsightsError::DataApi(format!("{} returned {}: {}", self.url, status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| InsightsError::DataApi(format!("invalid JSON from {}: {}", self.url, e)))?;
        Ok(normalize_response(body))
    }
}

/// Executes SQL live when a data API is configured, otherwise (or on any
/// failure) serves the matching canned dataset.
pub struct QueryExecutor {
    live: Option<DataApiClient>,
}

impl QueryExecutor {
    pub fn new(config: &DataApiConfig) -> Result<Self> {
        let live = match (&config.base_url, config.use_mock_data) {
            (Some(url), false) => Some(DataApiClient::new(url, config)?),
            (_, true) => {
                info!("USE_MOCK_DATA is set; queries will be answered from mock data");
                None
            }
            (None, false) => {
                info!("DATABASE_API_URL is not set; queries will be answered from mock data");
                None
            }
        };
        Ok(Self { live })
    }

    pub fn mock_only() -> Self {
        Self { live: None }
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub async fn execute(&self, question: &str, sql: &str) -> ExecutionOutcome {
        let started = Instant::now();

        if let Some(client) = &self.live {
            match client.run(sql).await {
                Ok(result) => {
                    let elapsed_secs = result.time.unwrap_or_else(|| started.elapsed().as_secs_f64());
                    info!("Query executed successfully, returned {} rows", result.rows.len());
                    return ExecutionOutcome {
                        count: result.count,
                        rows: result.rows,
                        elapsed_secs,
                        source: DataSource::Live,
                    };
                }
                Err(e) => warn!("Error executing query, using mock data instead: {}", e),
            }
        }

        let dataset = mock_data_for(question, sql);
        let rows = dataset.rows();
        debug!("Serving mock dataset {:?}", dataset);
        ExecutionOutcome {
            count: rows.len(),
            rows,
            elapsed_secs: started.elapsed().as_secs_f64(),
            source: DataSource::Mock(dataset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_results_envelope() {
        let result = normalize_response(json!({
            "results": [{"id": 1}, {"id": 2}],
            "count": 40,
            "time": 0.25
        }));
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.count, 40);
        assert_eq!(result.time, Some(0.25));

        let result = normalize_response(json!({"results": [{"id": 1}]}));
        assert_eq!(result.count, 1);
        assert_eq!(result.time, None);
    }

    #[test]
    fn test_normalize_bare_shapes() {
        let result = normalize_response(json!([{"a": 1}, 7]));
        assert_eq!(result.count, 2);
        assert_eq!(result.rows[1]["value"], 7);

        let result = normalize_response(json!({"total_earned_points": 170618272}));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["total_earned_points"], 170618272);

        let result = normalize_response(json!(42));
        assert_eq!(result.rows[0]["value"], 42);

        assert!(normalize_response(Value::Null).rows.is_empty());
    }

    #[test]
    fn test_object_with_non_array_results_is_a_row() {
        let result = normalize_response(json!({"results": "none"}));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["results"], "none");
    }

    #[test]
    fn test_mock_mode_when_no_url() {
        let executor = QueryExecutor::new(&DataApiConfig::default()).unwrap();
        assert!(!executor.is_live());

        let config = DataApiConfig {
            base_url: Some("http://localhost:4000".to_string()),
            use_mock_data: true,
            ..DataApiConfig::default()
        };
        assert!(!QueryExecutor::new(&config).unwrap().is_live());
    }

    #[test]
    fn test_client_url_uses_endpoint() {
        let config = DataApiConfig {
            endpoint: crate::config::DataApiEndpoint::ExecuteQuery,
            ..DataApiConfig::default()
        };
        let client = DataApiClient::new("http://data.local/", &config).unwrap();
        assert_eq!(client.url(), "http://data.local/execute-query");
    }

    #[tokio::test]
    async fn test_mock_execution_routes_by_question_then_sql() {
        let executor = QueryExecutor::mock_only();

        let outcome = executor.execute("top point holders", "SELECT 1").await;
        assert_eq!(outcome.source, DataSource::Mock(MockDataset::TopPointHolders));
        assert_eq!(outcome.count, 5);

        let outcome = executor
            .execute("recent activity", "SELECT * FROM points_transactions")
            .await;
        assert_eq!(outcome.mock_dataset(), Some(MockDataset::PointsTransactions));
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back_to_mock() {
        let config = DataApiConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            timeout: std::time::Duration::from_secs(2),
            ..DataApiConfig::default()
        };
        let executor = QueryExecutor::new(&config).unwrap();
        assert!(executor.is_live());

        let outcome = executor.execute("expiring points", "SELECT 1").await;
        assert_eq!(outcome.source, DataSource::Mock(MockDataset::ExpiringPoints));
        assert!(!outcome.rows.is_empty());
    }
}
