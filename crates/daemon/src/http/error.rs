// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single `IntoResponse` mapping from every component error kind to the
//! `{error:{code,message,details}}` envelope (§7 "Ambient addition — error
//! type hierarchy").

use ab_core::error::{ErrorBody, ErrorCode, ErrorEnvelope};
use ab_core::TaskError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Every failure an HTTP handler can hand back, keyed on the §7 taxonomy.
#[derive(Debug)]
pub enum AppError {
    TaskConflict(String),
    NotFound(String),
    NotRunning(String),
    AdmissionDenied,
    AuthFailure,
    Validation(String),
    Io(String),
    /// Storage unavailable mid-operation (§6 profiles row: 503, not 500 —
    /// a profile swap that can't touch disk is a transient condition, not
    /// a taxonomy-level server bug).
    Unavailable(String),
}

impl AppError {
    fn code(&self) -> ErrorCode {
        match self {
            AppError::TaskConflict(_) => ErrorCode::TaskConflict,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::NotRunning(_) => ErrorCode::NotRunning,
            AppError::AdmissionDenied => ErrorCode::AdmissionDenied,
            AppError::AuthFailure => ErrorCode::AuthFailure,
            AppError::Validation(_) => ErrorCode::Validation,
            AppError::Io(_) | AppError::Unavailable(_) => ErrorCode::Io,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            other => StatusCode::from_u16(other.code().status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::TaskConflict(m)
            | AppError::NotFound(m)
            | AppError::NotRunning(m)
            | AppError::Validation(m)
            | AppError::Io(m)
            | AppError::Unavailable(m) => m.clone(),
            AppError::AdmissionDenied => "admission denied: too many concurrent sessions".to_string(),
            AppError::AuthFailure => "missing or invalid bearer token".to_string(),
        }
    }
}

impl From<TaskError> for AppError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::Conflict(key) => AppError::TaskConflict(key.to_string()),
            TaskError::NotFound(m) => AppError::NotFound(m),
            TaskError::NotRunning(m) => AppError::NotRunning(m),
        }
    }
}

impl From<ab_storage::CredentialError> for AppError {
    fn from(e: ab_storage::CredentialError) -> Self {
        match e {
            ab_storage::CredentialError::InvalidName(n) => AppError::Validation(format!("invalid profile name: {n}")),
            ab_storage::CredentialError::NotFound(n) => AppError::NotFound(format!("profile not found: {n}")),
            e @ (ab_storage::CredentialError::Io(_) | ab_storage::CredentialError::Serde(_)) => AppError::Unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.message(),
                details: serde_json::json!({}),
            },
        };
        (status, Json(body)).into_response()
    }
}
