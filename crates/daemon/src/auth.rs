// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constant-time bearer-token auth middleware (§6 "Authentication").
//!
//! Guards every route except `/health`. When no bearer token is configured,
//! requests are let through unless `environment == "production"` — a
//! production deployment with no token configured can never authenticate,
//! so every request is rejected rather than silently bypassed.

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::http::error::AppError;
use crate::state::AppState;

pub async fn require_bearer(State(state): State<AppState>, req: Request<axum::body::Body>, next: Next) -> Response {
    if !state.config.auth_required() {
        return next.run(req).await;
    }

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let expected = state.config.bearer_token.as_deref();
    let ok = match (presented, expected) {
        (Some(p), Some(e)) => bool::from(p.as_bytes().ct_eq(e.as_bytes())),
        _ => false,
    };

    if ok {
        next.run(req).await
    } else {
        AppError::AuthFailure.into_response()
    }
}
