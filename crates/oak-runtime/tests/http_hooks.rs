//! Exercises the hook surface end to end over real HTTP: session-start,
//! prompt-submit, post-tool-use, session-end, landing rows in the
//! relational store the way a coding agent's hook scripts would drive it.

use std::sync::{Arc, Mutex};

use oak_index::Database;
use oak_runtime::{AppState, Ingestor};
use serde_json::json;

async fn spawn_server() -> (String, Arc<AppState>) {
    let conn = Arc::new(Mutex::new(Database::open_in_memory().unwrap().into_conn()));
    let ingestor = Ingestor::new("test-machine", 20);
    let state = Arc::new(AppState::new(conn, ingestor, None, None, "0.0.0-test", oak_index::SCHEMA_VERSION));

    let app = oak_runtime::hooks::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn full_hook_cycle_lands_expected_rows() {
    let (base, state) = spawn_server().await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client.get(format!("{base}/healthz")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let start: serde_json::Value = client
        .post(format!("{base}/hooks/session-start"))
        .json(&json!({"session_id": "s1", "agent": "claude-code", "source": "startup", "project_root": "/repo"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(start["status"], "created");

    let submit: serde_json::Value = client
        .post(format!("{base}/hooks/prompt-submit"))
        .json(&json!({"session_id": "s1", "prompt": "fix the flaky test", "agent": "claude-code"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let batch_id = submit["prompt_batch_id"].as_str().unwrap().to_string();

    let tool: serde_json::Value = client
        .post(format!("{base}/hooks/post-tool-use"))
        .json(&json!({
            "session_id": "s1",
            "tool_name": "Edit",
            "tool_input": {"file": "src/lib.rs"},
            "tool_output_summary": "applied patch",
            "success": true,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tool["status"], "buffered");

    client
        .post(format!("{base}/hooks/session-end"))
        .json(&json!({"session_id": "s1", "agent": "claude-code"}))
        .send()
        .await
        .unwrap();

    let conn = state.conn.lock().unwrap();
    let session = oak_index::queries::sessions::get(&conn, "s1").unwrap().unwrap();
    assert_eq!(session.status, oak_types::SessionStatus::Completed);

    let batch = oak_index::queries::prompt_batches::get(&conn, &batch_id).unwrap().unwrap();
    assert_eq!(batch.status, oak_types::BatchStatus::Completed);

    let activities = oak_index::queries::activities::list_for_session(&conn, "s1", None, 10).unwrap();
    let in_batch: Vec<_> = activities.iter().filter(|a| a.prompt_batch_id.as_deref() == Some(batch_id.as_str())).collect();
    assert_eq!(in_batch.len(), 1);
    assert_eq!(in_batch[0].tool_name, "Edit");
}

#[tokio::test]
async fn missing_bearer_token_is_rejected_when_configured() {
    let conn = Arc::new(Mutex::new(Database::open_in_memory().unwrap().into_conn()));
    let ingestor = Ingestor::new("test-machine", 20);
    let state = Arc::new(AppState::new(conn, ingestor, None, Some("secret-token".to_string()), "0.0.0-test", oak_index::SCHEMA_VERSION));
    let app = oak_runtime::hooks::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/hooks/session-start"))
        .json(&json!({"session_id": "s1", "agent": "claude-code", "source": "startup"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}
