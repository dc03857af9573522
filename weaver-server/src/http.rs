//! Weaver HTTP REST API
//!
//! Axum-based HTTP server exposing the story engine over HTTP.
//! Runs alongside the Unix socket IPC server on port 8770 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, Value)`; the inner functions go through the same
//! router as IPC requests, so both surfaces behave identically.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /version
//! - POST /sessions                 start a session (extracts characters)
//! - GET  /sessions/:id             session snapshot
//! - POST /sessions/:id/character   `{"name": "..."}`
//! - POST /sessions/:id/action      `{"choice": 2}` or `{"choice": "2"}`
//! - GET  /sessions/:id/history     turn history, oldest first

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;
use weaver_core::config::HttpConfig;
use weaver_core::ipc::{StoryRequest, StoryResponse, PROTOCOL_VERSION};

use crate::state::AppState;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/sessions", post(start_session_handler))
        .route("/sessions/:id", get(get_session_handler))
        .route("/sessions/:id/character", post(select_character_handler))
        .route("/sessions/:id/action", post(choose_action_handler))
        .route("/sessions/:id/history", get(history_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    config: HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Weaver HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct SelectCharacterBody {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChooseActionBody {
    /// A number or a numeric string; validated by the engine.
    pub choice: Option<Value>,
}

fn bad_request(msg: &str) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({
            "error": msg,
            "code": "bad_request",
            "status": "error",
        }),
    )
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, Value) {
    let response = crate::router::handle_request(StoryRequest::Health, state).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
                obj.insert("socket".to_string(), json!(state.socket_path));
            }
            (StatusCode::OK, data)
        }
        Err((_, body)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "error": body["error"],
            }),
        ),
    }
}

/// Version info (pure, no IO).
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": format!("weaver/{}", PROTOCOL_VERSION),
    })
}

pub async fn start_session_inner(state: &AppState) -> (StatusCode, Value) {
    let response = crate::router::handle_request(StoryRequest::StartSession, state).await;
    into_http(response, StatusCode::CREATED)
}

pub async fn get_session_inner(state: &AppState, session_id: Uuid) -> (StatusCode, Value) {
    let response =
        crate::router::handle_request(StoryRequest::GetSession { session_id }, state).await;
    into_http(response, StatusCode::OK)
}

pub async fn select_character_inner(
    state: &AppState,
    session_id: Uuid,
    body: SelectCharacterBody,
) -> (StatusCode, Value) {
    let name = match body.name {
        Some(n) if !n.trim().is_empty() => n,
        _ => return bad_request("name field is required"),
    };
    let response = crate::router::handle_request(
        StoryRequest::SelectCharacter { session_id, name },
        state,
    )
    .await;
    into_http(response, StatusCode::OK)
}

pub async fn choose_action_inner(
    state: &AppState,
    session_id: Uuid,
    body: ChooseActionBody,
) -> (StatusCode, Value) {
    let choice = match body.choice {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return bad_request("choice field is required"),
    };
    let response = crate::router::handle_request(
        StoryRequest::ChooseAction { session_id, choice },
        state,
    )
    .await;
    into_http(response, StatusCode::OK)
}

pub async fn history_inner(state: &AppState, session_id: Uuid) -> (StatusCode, Value) {
    let response =
        crate::router::handle_request(StoryRequest::History { session_id }, state).await;
    into_http(response, StatusCode::OK)
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn start_session_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = start_session_inner(&state).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&state, id).await;
    (status, Json(body))
}

pub async fn select_character_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectCharacterBody>,
) -> impl IntoResponse {
    let (status, body) = select_character_inner(&state, id, body).await;
    (status, Json(body))
}

pub async fn choose_action_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ChooseActionBody>,
) -> impl IntoResponse {
    let (status, body) = choose_action_inner(&state, id, body).await;
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = history_inner(&state, id).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for an engine error code.
pub fn status_for_code(code: Option<&str>) -> StatusCode {
    match code {
        Some("bad_request") => StatusCode::BAD_REQUEST,
        Some("session_not_found") => StatusCode::NOT_FOUND,
        Some("unexpected_input") => StatusCode::CONFLICT,
        Some("character_not_found") | Some("invalid_action_index") => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Some("malformed_response") | Some("extraction_exhausted") => StatusCode::BAD_GATEWAY,
        Some("store_unavailable")
        | Some("memory_unavailable")
        | Some("completion_unavailable")
        | Some("embedding_unavailable") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Split a `StoryResponse` into its data, or the status and body of an error.
pub fn response_to_http(
    response: StoryResponse,
) -> std::result::Result<Value, (StatusCode, Value)> {
    if response.is_ok() {
        return Ok(response.data.unwrap_or(json!({})));
    }
    let status = status_for_code(response.code.as_deref());
    Err((
        status,
        json!({
            "error": response.error.unwrap_or_else(|| "unknown error".to_string()),
            "code": response.code,
            "status": "error",
        }),
    ))
}

fn into_http(response: StoryResponse, success: StatusCode) -> (StatusCode, Value) {
    match response_to_http(response) {
        Ok(data) => (success, data),
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "weaver/0.1.0");
    }

    #[test]
    fn test_response_to_http_ok() {
        let resp = StoryResponse::ok(json!({"remaining_steps": 9}));
        assert_eq!(response_to_http(resp).unwrap()["remaining_steps"], 9);
    }

    #[test]
    fn test_response_to_http_ok_no_data() {
        let mut resp = StoryResponse::ok(json!({}));
        resp.data = None;
        assert!(response_to_http(resp).unwrap().is_object());
    }

    #[test]
    fn test_response_to_http_error_maps_code() {
        let resp = StoryResponse::err_with_code("invalid_action_index", "choose 1-3");
        let (status, body) = response_to_http(resp).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "choose 1-3");
        assert_eq!(body["code"], "invalid_action_index");
    }

    #[test]
    fn test_response_to_http_error_no_message() {
        let mut resp = StoryResponse::err("x");
        resp.error = None;
        let (status, body) = response_to_http(resp).unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unknown error");
    }

    #[test]
    fn test_status_for_code() {
        assert_eq!(status_for_code(Some("session_not_found")), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code(Some("unexpected_input")), StatusCode::CONFLICT);
        assert_eq!(status_for_code(Some("malformed_response")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for_code(Some("completion_unavailable")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for_code(None), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
