use serde_json::{json, Value};
use uuid::Uuid;
use weaver_core::ipc::{StoryRequest, StoryResponse};

use crate::state::AppState;
use crate::subsystems::engine::EngineError;

pub async fn handle_request(request: StoryRequest, state: &AppState) -> StoryResponse {
    match request {
        StoryRequest::Ping => StoryResponse::pong(),
        StoryRequest::Health => handle_health(state).await,
        StoryRequest::StartSession => respond(start_session(state).await),
        StoryRequest::SelectCharacter { session_id, name } => {
            respond(select_character(state, session_id, &name).await)
        }
        StoryRequest::ChooseAction { session_id, choice } => {
            respond(choose_action(state, session_id, &choice).await)
        }
        StoryRequest::GetSession { session_id } => respond(get_session(state, session_id).await),
        StoryRequest::History { session_id } => respond(history(state, session_id).await),
    }
}

fn respond(result: Result<Value, EngineError>) -> StoryResponse {
    match result {
        Ok(data) => StoryResponse::ok(data),
        Err(e) => {
            if e.is_recoverable() {
                tracing::debug!(code = e.code(), "Request rejected: {}", e);
            } else {
                tracing::error!(code = e.code(), "Request failed: {}", e);
            }
            StoryResponse::err_with_code(e.code(), e.to_string())
        }
    }
}

async fn handle_health(state: &AppState) -> StoryResponse {
    let backends = state.engine.backends();
    let Some(pool) = &state.pool else {
        return StoryResponse::ok(json!({
            "status": "healthy",
            "backends": backends,
            "sessions": state.sessions.len().await,
        }));
    };

    let pg_ver = match weaver_core::db::health_check(pool).await {
        Ok(v) => v,
        Err(e) => {
            return StoryResponse::err_with_code(
                "store_unavailable",
                format!("DB Health Check failed: {}", e),
            )
        }
    };
    let vec_ver = match weaver_core::db::check_pgvector(pool).await {
        Ok(v) => v,
        Err(e) => {
            return StoryResponse::err_with_code(
                "store_unavailable",
                format!("pgvector Check failed: {}", e),
            )
        }
    };
    StoryResponse::ok(json!({
        "status": "healthy",
        "postgresql": pg_ver,
        "pgvector": vec_ver,
        "backends": backends,
        "sessions": state.sessions.len().await,
    }))
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

async fn start_session(state: &AppState) -> Result<Value, EngineError> {
    let session = state.engine.start_session().await?;
    let data = json!({
        "session_id": session.id,
        "state": session.state,
        "remaining_steps": session.remaining_steps,
        "characters": to_value(&session.characters),
    });
    state.sessions.insert(session).await;
    Ok(data)
}

async fn select_character(
    state: &AppState,
    session_id: Uuid,
    name: &str,
) -> Result<Value, EngineError> {
    let handle = state.sessions.get(session_id).await?;
    let mut session = handle.lock().await;
    let outcome = state.engine.select_character(&mut session, name).await?;
    Ok(to_value(&outcome))
}

async fn choose_action(
    state: &AppState,
    session_id: Uuid,
    choice: &str,
) -> Result<Value, EngineError> {
    let handle = state.sessions.get(session_id).await?;
    let mut session = handle.lock().await;
    let outcome = state.engine.choose_action(&mut session, choice).await?;
    Ok(to_value(&outcome))
}

async fn get_session(state: &AppState, session_id: Uuid) -> Result<Value, EngineError> {
    let handle = state.sessions.get(session_id).await?;
    let session = handle.lock().await;
    Ok(to_value(&*session))
}

async fn history(state: &AppState, session_id: Uuid) -> Result<Value, EngineError> {
    // Only known sessions have a history worth reporting.
    state.sessions.get(session_id).await?;
    let entries = state.engine.history(session_id).await?;
    let entries: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "role": e.role.as_str(),
                "content": e.content,
                "created_at": e.created_at,
            })
        })
        .collect();
    Ok(json!({
        "session_id": session_id,
        "count": entries.len(),
        "entries": entries,
    }))
}
