// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The SSE event taxonomy (§6) and the raw agent-subprocess message shape
//! it is translated from (§4.G / §3 "AgentRawEvent").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single event on the SSE stream / in the durable event log. The
/// discriminant is preserved on the wire and in the JSONL log via
/// `#[serde(tag = "type")]`, matching the scaffold's own tagged-union
/// convention for its domain event enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Session {
        session_id: String,
    },
    Progress {
        text: String,
    },
    TextStart {
        card_id: String,
    },
    TextDelta {
        card_id: String,
        text: String,
    },
    TextEnd {
        card_id: String,
    },
    ToolStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card_id: Option<String>,
        tool_name: String,
        tool_input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card_id: Option<String>,
        tool_name: String,
        result: String,
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
    },
    Compact {
        trigger: String,
        message: String,
    },
    ContextUsage {
        used_tokens: u64,
        max_tokens: u64,
        percent: f64,
    },
    Debug {
        message: String,
    },
    CredentialAlert {
        active_profile: String,
        profiles: Vec<Value>,
    },
    InterventionSent {
        user: String,
        text: String,
    },
    Reconnected {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_progress: Option<String>,
    },
    Complete {
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        claude_session_id: Option<String>,
        #[serde(default)]
        attachments: Vec<String>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    Result {
        success: bool,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Event {
    /// The `type` discriminant as it appears on the wire, used for the
    /// event log's `last_event_type` summary without round-tripping through
    /// serde_json for every listing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Session { .. } => "session",
            Event::Progress { .. } => "progress",
            Event::TextStart { .. } => "text_start",
            Event::TextDelta { .. } => "text_delta",
            Event::TextEnd { .. } => "text_end",
            Event::ToolStart { .. } => "tool_start",
            Event::ToolResult { .. } => "tool_result",
            Event::Compact { .. } => "compact",
            Event::ContextUsage { .. } => "context_usage",
            Event::Debug { .. } => "debug",
            Event::CredentialAlert { .. } => "credential_alert",
            Event::InterventionSent { .. } => "intervention_sent",
            Event::Reconnected { .. } => "reconnected",
            Event::Complete { .. } => "complete",
            Event::Error { .. } => "error",
            Event::Result { .. } => "result",
        }
    }

    /// True for the two terminal event kinds that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete { .. } | Event::Error { .. })
    }
}

/// One durable log entry: `{id, event}` as written to the per-session
/// JSONL file and replayed on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub event: Event,
}

/// The newline-JSON message shape emitted by the agent subprocess on its
/// stdout (§3, ambient addition). Unknown `type` values deserialize into
/// `Unknown` rather than failing, so the adapter can log-and-skip them
/// per §7's "agent protocol" error kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentRawEvent {
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// e.g. `"compact_boundary"`, the agent's signal that it is about
        /// to discard context. `None` for a plain session/keepalive message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },
    Assistant {
        content: Vec<ContentBlock>,
    },
    User {
        content: Vec<ContentBlock>,
    },
    RateLimit {
        #[serde(rename = "rateLimitType")]
        rate_limit_type: String,
        utilization: Value,
        #[serde(rename = "resetsAt", default, skip_serializing_if = "Option::is_none")]
        resets_at: Option<String>,
    },
    Result {
        success: bool,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    #[serde(other)]
    Unknown,
}

/// One content block within an `assistant`/`user` raw message: either a
/// visible text chunk or a tool invocation/result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
