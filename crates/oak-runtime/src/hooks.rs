//! The inbound HTTP surface: coding-agent hooks land here, get translated
//! into ingestor calls, and a handful of ambient endpoints (OTLP logs,
//! health/version) ride alongside for agents that speak those protocols
//! instead.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use oak_index::queries::prompt_batches;
use oak_types::{Activity, BatchStatus, ParentReason, SourceType};
use oak_vector::VectorStore;

use crate::ingest::Ingestor;
use crate::{Error, Result};

const DEDUP_CACHE_CAPACITY: usize = 512;

/// Shared daemon state every handler closes over. `conn` is a single
/// writer connection behind a mutex; reads and writes on the hook path
/// are small enough that serializing them here is simpler than running
/// a reader pool for this surface.
pub struct AppState {
    pub conn: Arc<Mutex<rusqlite::Connection>>,
    pub ingestor: Ingestor,
    pub vector_store: Option<VectorStore>,
    pub bearer_token: Option<String>,
    pub version: String,
    pub schema_version: i32,
    dedup: Mutex<VecDeque<String>>,
}

impl AppState {
    pub fn new(conn: Arc<Mutex<rusqlite::Connection>>, ingestor: Ingestor, vector_store: Option<VectorStore>, bearer_token: Option<String>, version: impl Into<String>, schema_version: i32) -> Self {
        Self { conn, ingestor, vector_store, bearer_token, version: version.into(), schema_version, dedup: Mutex::new(VecDeque::with_capacity(DEDUP_CACHE_CAPACITY)) }
    }

    /// Returns `true` if this key was already seen (and records it if not),
    /// so callers can treat the second copy of a retried hook as a no-op.
    fn seen_before(&self, key: &str) -> bool {
        let mut dedup = self.dedup.lock().unwrap();
        if dedup.iter().any(|seen| seen == key) {
            return true;
        }
        if dedup.len() >= DEDUP_CACHE_CAPACITY {
            dedup.pop_front();
        }
        dedup.push_back(key.to_string());
        false
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/hooks/session-start", post(session_start))
        .route("/hooks/session-end", post(session_end))
        .route("/hooks/prompt-submit", post(prompt_submit))
        .route("/hooks/post-tool-use", post(post_tool_use))
        .route("/v1/logs", post(otlp_logs))
        .with_state(state)
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), (StatusCode, &'static str)> {
    let Some(expected) = &state.bearer_token else { return Ok(()) };
    let provided = headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "missing or invalid bearer token"))
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "oak_version": state.version,
        "schema_version": state.schema_version,
    }))
}

#[derive(Debug, Deserialize)]
struct SessionStartRequest {
    session_id: String,
    agent: String,
    source: String,
    parent_session_id: Option<String>,
    project_root: Option<String>,
}

async fn session_start(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<SessionStartRequest>) -> impl IntoResponse {
    if let Err(err) = check_auth(&state, &headers) {
        return err.into_response();
    }

    let dedup_key = format!("session-start|{}|{}|{}", req.session_id, req.agent, req.source);
    if state.seen_before(&dedup_key) {
        return Json(json!({"status": "duplicate", "session_id": req.session_id})).into_response();
    }

    let project_root = req.project_root.as_deref().unwrap_or("");
    let conn = state.conn.lock().unwrap();

    let (session, created) = match state.ingestor.ensure_session(&conn, &req.session_id, &req.agent, project_root) {
        Ok(v) => v,
        Err(err) => return error_response(err),
    };

    if let Some(parent_id) = &req.parent_session_id {
        if let Err(err) = state.ingestor.set_session_parent(&conn, &session.id, parent_id, ParentReason::Explicit) {
            tracing::warn!(session_id = session.id, parent_id, error = %err, "could not link declared parent session");
        }
    }

    let stats = state.vector_store.as_ref().map(|store| store.stats());

    Json(json!({
        "status": if created { "created" } else { "resumed" },
        "session_id": session.id,
        "context": {
            "injected_context": Value::Null,
            "project_root": session.project_root,
            "index": {
                "code_chunks": stats.as_ref().map(|s| s.code).unwrap_or(0),
                "memory_observations": stats.as_ref().map(|s| s.memory).unwrap_or(0),
                "status": if stats.is_some() { "ready" } else { "unavailable" },
            },
        },
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SessionEndRequest {
    session_id: String,
    #[allow(dead_code)]
    agent: String,
}

async fn session_end(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<SessionEndRequest>) -> impl IntoResponse {
    if let Err(err) = check_auth(&state, &headers) {
        return err.into_response();
    }

    let mut conn = state.conn.lock().unwrap();
    if let Err(err) = state.ingestor.flush_activity_buffer(&mut conn) {
        return error_response(err);
    }

    if let Ok(batches) = prompt_batches::list_for_session(&conn, &req.session_id) {
        if let Some(active) = batches.iter().find(|b| b.status == BatchStatus::Active) {
            if let Err(err) = state.ingestor.end_prompt_batch(&conn, &active.id) {
                tracing::warn!(batch_id = active.id, error = %err, "failed to end active batch at session end");
            }
        }
    }

    match oak_index::queries::sessions::get(&conn, &req.session_id) {
        Ok(Some(mut session)) => {
            session.status = oak_types::SessionStatus::Completed;
            session.ended_at = Some(oak_types::Timestamp::now());
            if let Err(err) = oak_index::queries::sessions::upsert(&conn, &session) {
                return error_response(Error::from(err));
            }
        }
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
        Err(err) => return error_response(Error::from(err)),
    }

    tracing::info!(session_id = req.session_id, "session ended; summary generation scheduled");
    Json(json!({"status": "ended", "session_id": req.session_id})).into_response()
}

#[derive(Debug, Deserialize)]
struct PromptSubmitRequest {
    session_id: String,
    prompt: String,
    #[allow(dead_code)]
    agent: String,
}

async fn prompt_submit(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<PromptSubmitRequest>) -> impl IntoResponse {
    if let Err(err) = check_auth(&state, &headers) {
        return err.into_response();
    }

    let conn = state.conn.lock().unwrap();
    match state.ingestor.create_prompt_batch(&conn, &req.session_id, &req.prompt, SourceType::User) {
        Ok(batch) => Json(json!({"prompt_batch_id": batch.id})).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct PostToolUseRequest {
    session_id: String,
    tool_name: String,
    tool_input: Option<Value>,
    tool_output_summary: Option<String>,
    file_path: Option<String>,
    #[serde(default)]
    files_affected: Vec<String>,
    success: bool,
    error_message: Option<String>,
}

async fn post_tool_use(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<PostToolUseRequest>) -> impl IntoResponse {
    if let Err(err) = check_auth(&state, &headers) {
        return err.into_response();
    }

    let id = uuid::Uuid::new_v4().to_string();
    let machine_id = state.ingestor.machine_id().to_string();
    let mut activity = Activity::new(&id, &req.session_id, &req.tool_name, &machine_id);
    activity.tool_input = req.tool_input;
    activity.tool_output_summary = req.tool_output_summary;
    activity.file_path = req.file_path;
    activity.files_affected = req.files_affected;
    activity.success = req.success;
    activity.error_message = req.error_message;
    activity.recompute_content_hash();

    if activity.success {
        let mut conn = state.conn.lock().unwrap();
        if let Ok(batches) = prompt_batches::list_for_session(&conn, &req.session_id) {
            if let Some(active) = batches.iter().find(|b| b.status == BatchStatus::Active) {
                activity.prompt_batch_id = Some(active.id.clone());
            }
        }
        match state.ingestor.add_activity_buffered(&mut conn, activity, false) {
            Ok(flushed) => Json(json!({"status": "buffered", "flushed_batch": flushed})).into_response(),
            Err(err) => error_response(err),
        }
    } else {
        let conn = state.conn.lock().unwrap();
        match state.ingestor.add_activity(&conn, activity) {
            Ok(()) => Json(json!({"status": "recorded"})).into_response(),
            Err(err) => error_response(err),
        }
    }
}

/// A small slice of the OTLP JSON log payload: one resource's scope logs,
/// each a list of `LogRecord`s carrying the attributes this daemon cares
/// about.
#[derive(Debug, Deserialize)]
struct OtlpLogsRequest {
    #[serde(rename = "resourceLogs", default)]
    resource_logs: Vec<OtlpResourceLogs>,
}

#[derive(Debug, Deserialize)]
struct OtlpResourceLogs {
    #[serde(rename = "scopeLogs", default)]
    scope_logs: Vec<OtlpScopeLogs>,
}

#[derive(Debug, Deserialize)]
struct OtlpScopeLogs {
    #[serde(rename = "logRecords", default)]
    log_records: Vec<OtlpLogRecord>,
}

#[derive(Debug, Deserialize)]
struct OtlpLogRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    #[serde(default)]
    attributes: Vec<OtlpAttribute>,
}

#[derive(Debug, Deserialize)]
struct OtlpAttribute {
    key: String,
    value: OtlpAnyValue,
}

#[derive(Debug, Deserialize)]
struct OtlpAnyValue {
    #[serde(rename = "stringValue", default)]
    string_value: Option<String>,
}

impl OtlpLogRecord {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.key == key).and_then(|a| a.value.string_value.as_deref())
    }
}

/// Maps OTel events named `*.conversation_starts` / `*.user_prompt` /
/// `*.tool_result` onto the three corresponding hooks, so agents that
/// emit OTLP don't need a second integration path.
async fn otlp_logs(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<OtlpLogsRequest>) -> impl IntoResponse {
    if let Err(err) = check_auth(&state, &headers) {
        return err.into_response();
    }

    let mut accepted = 0usize;
    for resource in &req.resource_logs {
        for scope in &resource.scope_logs {
            for record in &scope.log_records {
                let Some(conversation_id) = record.attribute("conversation_id") else { continue };

                if record.event_name.ends_with(".conversation_starts") {
                    let conn = state.conn.lock().unwrap();
                    let _ = state.ingestor.ensure_session(&conn, conversation_id, "otlp", record.attribute("project_root").unwrap_or(""));
                    accepted += 1;
                } else if record.event_name.ends_with(".user_prompt") {
                    if let Some(prompt) = record.attribute("prompt") {
                        let conn = state.conn.lock().unwrap();
                        let _ = state.ingestor.create_prompt_batch(&conn, conversation_id, prompt, SourceType::User);
                        accepted += 1;
                    }
                } else if record.event_name.ends_with(".tool_result") {
                    let tool_name = record.attribute("tool.name").unwrap_or("unknown").to_string();
                    let id = uuid::Uuid::new_v4().to_string();
                    let mut activity = Activity::new(&id, conversation_id, &tool_name, state.ingestor.machine_id());
                    activity.tool_output_summary = record.attribute("tool.result").map(str::to_string);
                    activity.recompute_content_hash();
                    let mut conn = state.conn.lock().unwrap();
                    let _ = state.ingestor.add_activity_buffered(&mut conn, activity, false);
                    accepted += 1;
                }
            }
        }
    }

    Json(json!({"status": "ok", "accepted": accepted})).into_response()
}

fn error_response(err: Error) -> axum::response::Response {
    tracing::error!(error = %err, "hook handler failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response()
}
