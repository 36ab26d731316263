// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP/SSE surface (§6), grounded in the reference gateway's axum
//! router layout: one module per resource, wired together here.

pub mod error;
pub mod profiles;
pub mod sessions;
pub mod tasks;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router (§6 "Endpoints"). `/health` is mounted outside
/// the auth layer; every other route requires a bearer token when
/// [`crate::config::Config::auth_required`] is true.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/execute", post(tasks::execute))
        .route("/tasks/:client_id", get(tasks::list_tasks))
        .route("/tasks/:client_id/:request_id", get(tasks::get_task))
        .route("/tasks/:client_id/:request_id/stream", get(tasks::stream_task))
        .route("/tasks/:client_id/:request_id/ack", post(tasks::ack_task))
        .route("/tasks/:client_id/:request_id/intervene", post(tasks::intervene_task))
        .route("/sessions/:session_id/intervene", post(sessions::intervene_session))
        .route("/status", get(tasks::status))
        .route("/profiles", get(profiles::list_profiles))
        .route("/profiles/active", get(profiles::active_profile))
        .route("/profiles/rate-limits", get(profiles::all_rate_limits))
        .route(
            "/profiles/:name",
            get(profiles::get_profile).post(profiles::save_profile).delete(profiles::delete_profile),
        )
        .route("/profiles/:name/activate", post(profiles::activate_profile))
        .route("/profiles/:name/save-current", post(profiles::save_current_profile))
        .route("/profiles/:name/rate-limit", get(profiles::profile_rate_limit))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), crate::auth::require_bearer));

    Router::new()
        .route("/health", get(tasks::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
