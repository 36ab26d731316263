// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/execute`, `/tasks/...` handlers (§6), grounded in the gateway task-API
//! idiom from the reference axum/SSE example: pre-flight admission check,
//! `Json`/`Path`/`Query` extractors, and an `async_stream`-built SSE body.

use std::convert::Infallible;

use ab_core::{AgentSessionId, ClientId, RequestId, Task, TaskKey, TaskStatus, ToolPolicy};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub client_id: String,
    pub request_id: String,
    pub prompt: String,
    #[serde(default)]
    pub resume_session_id: Option<String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    pub disallowed_tools: Option<Vec<String>>,
    #[serde(default = "default_use_mcp")]
    pub use_mcp: bool,
}

fn default_use_mcp() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub client_id: String,
    pub request_id: String,
    pub status: TaskStatus,
    pub prompt: String,
    pub agent_session_id: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Task> for TaskView {
    fn from(t: Task) -> Self {
        Self {
            client_id: t.client_id.as_str().to_string(),
            request_id: t.request_id.as_str().to_string(),
            status: t.status,
            prompt: t.prompt,
            agent_session_id: t.agent_session_id.as_ref().map(|s| s.as_str().to_string()),
            result: t.result,
            error: t.error,
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

/// `POST /execute` (§6): creates the task, performs a synchronous
/// admission probe, then opens the SSE stream for the caller's own
/// listener registered before the worker is started so no early event
/// is lost (§9 "session-id discovery is mid-run" applies symmetrically
/// to the very first event too).
pub async fn execute(State(state): State<AppState>, Json(body): Json<ExecuteBody>) -> Result<Response, AppError> {
    // Admission probe: a true reservation is taken again inside the
    // worker itself (`TaskManager::run_worker`); this is a fast-fail so a
    // client at the concurrency cap gets 503 instead of a task record it
    // then has to `ack`.
    let probe = state.resources.acquire(Some(state.config.admission_timeout)).await;
    if probe.is_none() {
        return Err(AppError::AdmissionDenied);
    }
    drop(probe);

    let tool_policy = ToolPolicy {
        allowed_tools: body.allowed_tools,
        disallowed_tools: body.disallowed_tools,
        use_mcp: body.use_mcp,
    };
    let resume_session_id = body.resume_session_id.map(AgentSessionId::new);

    let task = state
        .task_manager
        .create_task(body.client_id.clone(), body.request_id.clone(), body.prompt, resume_session_id, tool_policy)?;
    let key = task.key();

    let Some(listener) = state.task_manager.add_listener(&key) else {
        return Err(AppError::NotFound(key.to_string()));
    };
    state.task_manager.start_execution(key, std::sync::Arc::clone(&state.engine), std::sync::Arc::clone(&state.resources));

    Ok(sse_response(listener))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// `GET /tasks/{client_id}` (§6).
pub async fn list_tasks(State(state): State<AppState>, Path(client_id): Path<String>, Query(q): Query<ListTasksQuery>) -> Json<Vec<TaskView>> {
    let mut tasks = state.task_manager.list_tasks(&ClientId::new(client_id));
    if let Some(status) = q.status {
        tasks.retain(|t| format!("{:?}", t.status).to_lowercase() == status.to_lowercase());
    }
    Json(tasks.into_iter().map(TaskView::from).collect())
}

/// `GET /tasks/{client_id}/{request_id}` (§6).
pub async fn get_task(State(state): State<AppState>, Path((client_id, request_id)): Path<(String, String)>) -> Result<Json<TaskView>, AppError> {
    let key = TaskKey::new(client_id, request_id);
    let task = state.task_manager.get_task(&key).ok_or_else(|| AppError::NotFound(key.to_string()))?;
    Ok(Json(task.into()))
}

/// `GET /tasks/{client_id}/{request_id}/stream` (§6): re-attach, honoring
/// `Last-Event-ID`.
pub async fn stream_task(
    State(state): State<AppState>,
    Path((client_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let key = TaskKey::new(client_id, request_id);
    if state.task_manager.get_task(&key).is_none() {
        return Err(AppError::NotFound(key.to_string()));
    }
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let Some(listener) = state.task_manager.add_listener_reconnect(&key, last_event_id).await else {
        return Err(AppError::NotFound(key.to_string()));
    };

    Ok(sse_response(listener))
}

/// `POST /tasks/{client_id}/{request_id}/ack` (§6).
pub async fn ack_task(State(state): State<AppState>, Path((client_id, request_id)): Path<(String, String)>) -> Result<StatusCode, AppError> {
    let key = TaskKey::new(client_id, request_id);
    state.task_manager.ack_task(&key)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct InterveneBody {
    pub text: String,
    pub user: String,
    #[serde(default)]
    pub attachment_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InterveneResponse {
    pub queue_position: usize,
}

/// `POST /tasks/{client_id}/{request_id}/intervene` (§6).
pub async fn intervene_task(
    State(state): State<AppState>,
    Path((client_id, request_id)): Path<(String, String)>,
    Json(body): Json<InterveneBody>,
) -> Result<(StatusCode, Json<InterveneResponse>), AppError> {
    let key = TaskKey::new(client_id, request_id);
    let position = state.task_manager.add_intervention(&key, body.text, body.user, body.attachment_paths)?;
    Ok((StatusCode::ACCEPTED, Json(InterveneResponse { queue_position: position })))
}

/// `GET /health` (§6): always 200, never behind auth.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /status` (§6): active tasks + pool stats.
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool_stats = state.pool.stats();
    let resource_stats = state.resources.stats();
    Json(json!({
        "pool": {
            "session_count": pool_stats.session_count,
            "generic_count": pool_stats.generic_count,
            "total": pool_stats.total,
            "max_size": pool_stats.max_size,
            "hits": pool_stats.hits,
            "misses": pool_stats.misses,
            "evictions": pool_stats.evictions,
        },
        "resources": {
            "active_sessions": resource_stats.active_sessions,
            "max_concurrent": resource_stats.max_concurrent,
            "available_slots": resource_stats.available_slots,
        },
    }))
}

/// Build the SSE response from a listener's receiver, matching the
/// reference gateway's `make_task_event_stream` idiom: one SSE `Event`
/// per `BroadcastEnvelope`, `id` set when the event was durably logged,
/// the stream closing after a terminal event.
fn sse_response(mut rx: tokio::sync::mpsc::Receiver<ab_engine::BroadcastEnvelope>) -> Response {
    let stream = async_stream::stream! {
        while let Some(envelope) = rx.recv().await {
            let terminal = envelope.event.is_terminal();
            let mut sse = SseEvent::default().event(envelope.event.type_name()).json_data(&envelope.event).unwrap_or_else(|_| SseEvent::default());
            if let Some(id) = envelope.event_id {
                sse = sse.id(id.to_string());
            }
            yield Ok::<_, Infallible>(sse);
            if terminal {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default().interval(std::time::Duration::from_secs(30)).text(": keepalive")).into_response()
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
