//! REST API server for the loyalty insights agent
//!
//! Routes:
//! - `POST /api/query`
//! - `GET /api/schema`
//! - `POST /api/chat/session`
//! - `GET|DELETE /api/chat/history/:session_id`
//! - `GET /health`

use crate::agent::LoyaltyAgent;
use crate::config::AppConfig;
use crate::error::{InsightsError, Result};
use crate::response::QueryResponse;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// API State - Shared between handlers
#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<LoyaltyAgent>,
}

impl ApiState {
    pub fn new(agent: LoyaltyAgent) -> Self {
        Self { agent: Arc::new(agent) }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Fields of a `/api/query` body
#[derive(Debug, PartialEq)]
struct QueryRequest {
    question: String,
    session_id: Option<String>,
    client_id: Option<i64>,
}

/// Each field is read on its own so one bad field gets its own 400
fn parse_query_request(body: &[u8]) -> std::result::Result<QueryRequest, &'static str> {
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let question = match value.get("question").and_then(Value::as_str).map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Err("Question is required"),
    };

    let client_id = match value.get("client_id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(id.as_i64().ok_or("client_id must be a number")?),
    };

    Ok(QueryRequest {
        question,
        session_id: value.get("session_id").and_then(Value::as_str).map(str::to_string),
        client_id,
    })
}

async fn query(State(state): State<ApiState>, body: Bytes) -> Response {
    let request = match parse_query_request(&body) {
        Ok(request) => request,
        Err(message) => return error_body(StatusCode::BAD_REQUEST, message),
    };

    match state
        .agent
        .process_question(&request.question, request.session_id.as_deref(), request.client_id)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("Error processing query: {}", e);
            let body = QueryResponse::internal_failure(&e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn schema(State(state): State<ApiState>) -> Response {
    Json(state.agent.get_schema().as_ref()).into_response()
}

async fn create_session(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let session_id = state.agent.create_session().await;
    info!("Created chat session {}", session_id);
    Json(json!({ "session_id": session_id }))
}

fn session_error(e: InsightsError) -> Response {
    match e {
        InsightsError::SessionNotFound(id) => {
            warn!("Unknown chat session {}", id);
            error_body(StatusCode::NOT_FOUND, "Session not found")
        }
        other => error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

async fn get_history(State(state): State<ApiState>, Path(session_id): Path<String>) -> Response {
    match state.agent.get_history(&session_id).await {
        Ok(history) => Json(json!({ "history": history })).into_response(),
        Err(e) => session_error(e),
    }
}

async fn clear_history(State(state): State<ApiState>, Path(session_id): Path<String>) -> Response {
    match state.agent.clear_history(&session_id).await {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(e) => session_error(e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.parse::<HeaderValue>() {
        Ok(value) if origin != "*" => cors.allow_origin(value),
        _ => cors.allow_origin(Any),
    }
}

/// Create the API router
pub fn create_router(state: ApiState, cors_origin: &str) -> Router {
    Router::new()
        .route("/api/query", post(query))
        .route("/api/schema", get(schema))
        .route("/api/chat/session", post(create_session))
        .route("/api/chat/history/:session_id", get(get_history).delete(clear_history))
        .route("/health", get(health))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// Start the API server
pub async fn start_server(config: &AppConfig, state: ApiState) -> Result<()> {
    let app = create_router(state, &config.cors_origin);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Loyalty insights API listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
