// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task data model: the unit of work keyed by `(client_id, request_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AgentSessionId, ClientId, RequestId};

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
}

/// Per-request tool policy handed to the engine adapter and, through it,
/// to the agent subprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallowed_tools: Option<Vec<String>>,
    #[serde(default = "default_use_mcp")]
    pub use_mcp: bool,
}

fn default_use_mcp() -> bool {
    true
}

/// The `(client_id, request_id)` composite key identifying a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub client_id: ClientId,
    pub request_id: RequestId,
}

impl TaskKey {
    pub fn new(client_id: impl Into<ClientId>, request_id: impl Into<RequestId>) -> Self {
        Self {
            client_id: client_id.into(),
            request_id: request_id.into(),
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client_id, self.request_id)
    }
}

/// One unit of agent work. Runtime-only fields (listeners, intervention
/// queue, execution handle) live alongside this struct in the task manager,
/// not here — this type is the persisted/observable shape.
#[derive(Debug, Clone)]
pub struct Task {
    pub client_id: ClientId,
    pub request_id: RequestId,
    pub prompt: String,
    pub status: TaskStatus,

    pub resume_session_id: Option<AgentSessionId>,
    pub agent_session_id: Option<AgentSessionId>,
    pub tool_policy: ToolPolicy,

    pub result: Option<String>,
    pub error: Option<String>,
    pub result_delivered: bool,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Last coarse `progress` text seen, surfaced on reconnect.
    pub last_progress_text: Option<String>,
}

impl Task {
    pub fn new(
        client_id: ClientId,
        request_id: RequestId,
        prompt: String,
        resume_session_id: Option<AgentSessionId>,
        tool_policy: ToolPolicy,
    ) -> Self {
        Self {
            client_id,
            request_id,
            prompt,
            status: TaskStatus::Running,
            resume_session_id,
            agent_session_id: None,
            tool_policy,
            result: None,
            error: None,
            result_delivered: false,
            created_at: Utc::now(),
            completed_at: None,
            last_progress_text: None,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.client_id.clone(), self.request_id.clone())
    }

    /// Persisted JSON shape: `tasks.json`'s per-entry record (§6, Persisted layout).
    /// Tool policy and every runtime-only field are intentionally absent.
    pub fn to_persisted(&self) -> PersistedTask {
        PersistedTask {
            client_id: self.client_id.as_str().to_string(),
            request_id: self.request_id.as_str().to_string(),
            prompt: self.prompt.clone(),
            status: self.status,
            resume_session_id: self.resume_session_id.as_ref().map(|s| s.as_str().to_string()),
            agent_session_id: self.agent_session_id.as_ref().map(|s| s.as_str().to_string()),
            result: self.result.clone(),
            error: self.error.clone(),
            result_delivered: self.result_delivered,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    pub fn from_persisted(p: PersistedTask) -> Self {
        Self {
            client_id: ClientId::new(p.client_id),
            request_id: RequestId::new(p.request_id),
            prompt: p.prompt,
            status: p.status,
            resume_session_id: p.resume_session_id.map(AgentSessionId::new),
            agent_session_id: p.agent_session_id.map(AgentSessionId::new),
            tool_policy: ToolPolicy::default(),
            result: p.result,
            error: p.error,
            result_delivered: p.result_delivered,
            created_at: p.created_at,
            completed_at: p.completed_at,
            last_progress_text: None,
        }
    }
}

/// Wire/on-disk shape for a task record, matching `{data_dir}/tasks.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTask {
    pub client_id: String,
    pub request_id: String,
    pub prompt: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub result_delivered: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Errors surfaced by task lifecycle operations (§7 taxonomy: client-key
/// conflict, not-found, not-running).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task already running: {0}")]
    Conflict(TaskKey),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task is not running: {0}")]
    NotRunning(String),
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
