//! Local stand-in for the upstream data API
//!
//! Answers `GET /query?query=...`, `POST /query` and `POST /execute-query`
//! with canned loyalty rows chosen from the SQL text, wrapped in the same
//! `{results, count, time}` envelope the real service returns.

use crate::mock_data::route_sql;
use axum::{
    body::Bytes,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    #[serde(default)]
    query: Option<String>,
}

fn answer(sql: Option<String>) -> Response {
    let started = Instant::now();
    let sql = match sql.filter(|s| !s.trim().is_empty()) {
        Some(sql) => sql,
        None => {
            warn!("Rejected data request without a query");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "query is required" }))).into_response();
        }
    };

    let dataset = route_sql(&sql);
    let rows = dataset.rows();
    info!("Serving {:?} ({} rows) for: {}", dataset, rows.len(), sql);
    Json(json!({
        "results": rows,
        "count": rows.len(),
        "time": started.elapsed().as_secs_f64(),
    }))
    .into_response()
}

async fn query_get(Query(params): Query<QueryParams>) -> Response {
    answer(params.query)
}

/// Empty or malformed bodies fall through to the missing-query 400
async fn query_post(body: Bytes) -> Response {
    let params: QueryParams = serde_json::from_slice(&body).unwrap_or_default();
    answer(params.query)
}

pub fn router() -> Router {
    Router::new()
        .route("/query", get(query_get).post(query_post))
        .route("/execute-query", post(query_post))
}
