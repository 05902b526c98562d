//! Router tests against the real coordinator

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use session_lobby_server::app::AppState;
use session_lobby_server::config::Config;
use session_lobby_server::http::build_router;
use session_lobby_server::ws::protocol::ServerMsg;

fn make_state() -> AppState {
    let config = Config {
        spawn_seed: Some(1),
        ..Config::default()
    };
    let (state, coordinator) = AppState::new(config);
    tokio::spawn(coordinator.run());
    state
}

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_open_session() {
    let state = make_state();
    let (status, json) = get_json(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
    assert_eq!(json["phase"], "open");
}

#[tokio::test]
async fn test_lobby_reflects_published_counts() {
    let state = make_state();
    let mut rx = state.lobby.subscribe();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    state.lobby.connect(a).await.unwrap();
    state.lobby.connect(b).await.unwrap();
    state.lobby.set_ready(a, true).await.unwrap();

    let wait = async {
        loop {
            if let Ok(ServerMsg::Readiness { ready_count: 1, .. }) = rx.recv().await {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("readiness never published");

    let (status, json) = get_json(&state, "/lobby").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready_count"], 1);
    assert_eq!(json["total_count"], 2);
    assert_eq!(json["phase"], "open");
    assert_eq!(json["target_activity"], "GameScene");
}

#[tokio::test]
async fn test_lobby_shows_transition() {
    let state = make_state();
    let mut rx = state.lobby.subscribe();
    let a = Uuid::new_v4();

    state.lobby.connect(a).await.unwrap();
    state.lobby.set_ready(a, true).await.unwrap();
    state.lobby.start_session(a).await.unwrap();

    let wait = async {
        loop {
            if let Ok(ServerMsg::SessionTransition { .. }) = rx.recv().await {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("transition never published");

    let (_, json) = get_json(&state, "/lobby").await;
    assert_eq!(json["phase"], "transitioned");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let state = make_state();
    let response = build_router(state)
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
