// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /sessions/{session_id}/intervene` (§6): same as the task-keyed
//! intervention endpoint, addressed by the agent's own session id.

use ab_core::AgentSessionId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::http::error::AppError;
use crate::http::tasks::{InterveneBody, InterveneResponse};
use crate::state::AppState;

pub async fn intervene_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<InterveneBody>,
) -> Result<(StatusCode, Json<InterveneResponse>), AppError> {
    let position = state
        .task_manager
        .add_intervention_by_session(&AgentSessionId::new(session_id), body.text, body.user, body.attachment_paths)?;
    Ok((StatusCode::ACCEPTED, Json(InterveneResponse { queue_position: position })))
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
