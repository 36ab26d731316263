// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET/POST/DELETE /profiles...` (§6): credential profile CRUD, activation,
//! and the per-profile rate-limit status the swapper's alerting relies on
//! (§4.B, §4.C).

use ab_core::ProfileMetadata;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::http::error::AppError;
use crate::state::AppState;

/// `GET /profiles` (§6).
pub async fn list_profiles(State(state): State<AppState>) -> Result<Json<Vec<ProfileMetadata>>, AppError> {
    Ok(Json(state.credentials.list_profiles()?))
}

/// `GET /profiles/active` (§6).
pub async fn active_profile(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let active = state.credentials.get_active()?;
    Ok(Json(serde_json::json!({"active": active})))
}

/// `GET /profiles/{name}` (§6): the raw stored credential blob.
pub async fn get_profile(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.credentials.get(&name)?))
}

/// `POST /profiles/{name}` (§6): save (or overwrite) a named profile from
/// an arbitrary JSON credential blob.
pub async fn save_profile(State(state): State<AppState>, Path(name): Path<String>, Json(blob): Json<Value>) -> Result<StatusCode, AppError> {
    state.credentials.save(&name, &blob)?;
    Ok(StatusCode::OK)
}

/// `DELETE /profiles/{name}` (§6).
pub async fn delete_profile(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    state.credentials.delete(&name)?;
    Ok(StatusCode::OK)
}

/// `POST /profiles/{name}/activate` (§6): atomic credentials-file swap
/// plus active-pointer update (§4.B `activate`).
pub async fn activate_profile(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    state.credentials.activate(&name)?;
    Ok(StatusCode::OK)
}

/// `POST /profiles/{name}/save-current` (§6): snapshot the live OS-level
/// credentials file as a new named profile and mark it active (§4.B
/// `save_current_as`).
pub async fn save_current_profile(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    state.credentials.save_current_as(&name).map_err(|e| match e {
        ab_storage::CredentialError::Io(_) => AppError::Unavailable(e.to_string()),
        other => AppError::from(other),
    })?;
    Ok(StatusCode::OK)
}

/// `GET /profiles/{name}/rate-limit` (§4.C).
pub async fn profile_rate_limit(State(state): State<AppState>, Path(name): Path<String>) -> Json<Value> {
    Json(state.rate_limiter.get_profile_status(&name))
}

/// `GET /profiles/rate-limits` (§4.C): every tracked profile's windows.
pub async fn all_rate_limits(State(state): State<AppState>) -> Json<Value> {
    Json(state.rate_limiter.get_all_profiles_status())
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
