//! HTTP integration tests for the Weaver REST API
//!
//! Every test runs against in-memory stores and a scripted completion
//! backend, driving the full axum router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use weaver_server::http::build_router;
use weaver_server::testing::{characters_json, scene_json, testing_state, ScriptedCompletion};

fn app(completion: Arc<ScriptedCompletion>, max_steps: u32) -> Router {
    build_router(Arc::new(testing_state(completion, max_steps)))
}

fn default_script() -> Arc<ScriptedCompletion> {
    Arc::new(ScriptedCompletion::with_texts([
        characters_json(&[("Alice", "stealth", "pride"), ("Bob", "strength", "greed")]),
        scene_json(
            "Mist rises from the river.",
            &["cross the bridge", "light the lantern", "call for Bob"],
        ),
        scene_json("The lantern catches.", &["climb the tower", "wait"]),
    ]))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn start(app: &Router) -> String {
    let (status, body) = call(app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED, "{:?}", body);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_version() {
    let app = app(default_script(), 10);

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["socket"], "/tmp/weaver-test.sock");
    assert_eq!(body["backends"]["fragments"], "memory");

    let (status, body) = call(&app, "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert!(body["protocol"].as_str().unwrap().starts_with("weaver/"));
}

#[tokio::test]
async fn test_play_first_turn() {
    let app = app(default_script(), 10);
    let id = start(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({"name": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{:?}", body);
    assert_eq!(body["remaining_steps"], 10);
    assert_eq!(body["character"], "Alice");
    assert_eq!(body["state"], "AWAITING_ACTION");
    assert_eq!(body["scene"]["actions"].as_array().unwrap().len(), 3);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sessions/{}/action", id),
        Some(json!({"choice": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{:?}", body);
    assert_eq!(body["remaining_steps"], 9);
    assert_eq!(body["scene"]["description"], "The lantern catches.");

    let (status, body) = call(&app, "GET", &format!("/sessions/{}/history", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(body["entries"][0]["role"], "human");
    assert_eq!(body["entries"][0]["content"], "Alice");
    assert_eq!(body["entries"][2]["content"], "light the lantern");
    assert_eq!(body["entries"][3]["role"], "assistant");
}

#[tokio::test]
async fn test_invalid_action_is_unprocessable() {
    let app = app(default_script(), 10);
    let id = start(&app).await;
    call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({"name": "Bob"})),
    )
    .await;

    for choice in [json!(0), json!(4), json!("-1"), json!("north")] {
        let (status, body) = call(
            &app,
            "POST",
            &format!("/sessions/{}/action", id),
            Some(json!({ "choice": choice })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{:?}", body);
        assert_eq!(body["code"], "invalid_action_index");
    }

    let (_, session) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(session["remaining_steps"], 10);
    assert_eq!(session["state"], "AWAITING_ACTION");
}

#[tokio::test]
async fn test_unknown_character_is_unprocessable() {
    let app = app(default_script(), 10);
    let id = start(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({"name": "Mallory"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "character_not_found");

    let (_, session) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(session["state"], "AWAITING_CHARACTER_SELECTION");
}

#[tokio::test]
async fn test_missing_fields_are_bad_requests() {
    let app = app(default_script(), 10);
    let id = start(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/sessions/{}/action", id),
        Some(json!({"choice": null})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_action_before_selection_conflicts() {
    let app = app(default_script(), 10);
    let id = start(&app).await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/sessions/{}/action", id),
        Some(json!({"choice": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "unexpected_input");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app(default_script(), 10);
    let (status, body) = call(
        &app,
        "GET",
        &format!("/sessions/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");
}

#[tokio::test]
async fn test_extraction_exhausted_is_bad_gateway() {
    let script = Arc::new(ScriptedCompletion::with_texts(vec!["no characters here"; 5]));
    let app = app(script, 10);

    let (status, body) = call(&app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "extraction_exhausted");
}

#[tokio::test]
async fn test_malformed_scene_is_bad_gateway_and_retryable() {
    let script = Arc::new(ScriptedCompletion::with_texts([
        characters_json(&[("Alice", "stealth", "pride")]),
        scene_json("The bridge creaks.", &["cross", "turn back"]),
        "Once upon a time...".to_string(),
        scene_json("You cross safely.", &["rest"]),
    ]));
    let app = app(script, 10);
    let id = start(&app).await;
    call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({"name": "alice"})),
    )
    .await;

    let uri = format!("/sessions/{}/action", id);
    let (status, body) = call(&app, "POST", &uri, Some(json!({"choice": 1}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "malformed_response");

    let (_, session) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(session["remaining_steps"], 10);
    assert_eq!(session["state"], "AWAITING_ACTION");

    let (status, body) = call(&app, "POST", &uri, Some(json!({"choice": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_steps"], 9);
}

#[tokio::test]
async fn test_story_runs_to_the_end() {
    let script = Arc::new(ScriptedCompletion::with_texts([
        characters_json(&[("Alice", "stealth", "pride")]),
        scene_json("Start.", &["go"]),
        scene_json("Middle.", &["go"]),
        scene_json("Alice reaches home.", &[]),
    ]));
    let app = app(script, 2);
    let id = start(&app).await;
    call(
        &app,
        "POST",
        &format!("/sessions/{}/character", id),
        Some(json!({"name": "Alice"})),
    )
    .await;

    let uri = format!("/sessions/{}/action", id);
    let (_, body) = call(&app, "POST", &uri, Some(json!({"choice": "1"}))).await;
    assert_eq!(body["remaining_steps"], 1);

    let (_, body) = call(&app, "POST", &uri, Some(json!({"choice": "1"}))).await;
    assert_eq!(body["remaining_steps"], 0);
    assert_eq!(body["state"], "TERMINAL");
    assert!(body["scene"]["actions"].as_array().unwrap().is_empty());

    let (status, body) = call(&app, "POST", &uri, Some(json!({"choice": "1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scene"]["description"], "THE END");
}
