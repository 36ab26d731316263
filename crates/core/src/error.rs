// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP error envelope (§6) and the stable error codes every component
//! error is mapped onto at the transport boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable machine-readable error codes, one per §7 taxonomy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TaskConflict,
    NotFound,
    NotRunning,
    AdmissionDenied,
    AuthFailure,
    AgentProtocol,
    AgentProcess,
    RateLimit,
    Io,
    Validation,
}

impl ErrorCode {
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::TaskConflict => 409,
            ErrorCode::NotFound => 404,
            ErrorCode::NotRunning => 409,
            ErrorCode::AdmissionDenied => 503,
            ErrorCode::AuthFailure => 401,
            ErrorCode::Validation => 400,
            ErrorCode::AgentProtocol
            | ErrorCode::AgentProcess
            | ErrorCode::RateLimit
            | ErrorCode::Io => 500,
        }
    }
}

/// `{"error": {"code", "message", "details"}}`, the single shape every
/// non-stream failure response takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Value::Null,
            },
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error.details = details;
        self
    }
}
