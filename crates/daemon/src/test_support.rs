// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-only helpers for building an [`AppState`] backed by a
//! [`ab_adapters::FakeAgentAdapter`] and a temp data directory, so the HTTP
//! layer can be exercised in-process via `tower::ServiceExt::oneshot`
//! without spawning the real binary or a real agent subprocess.

#![cfg(test)]

use std::sync::Arc;

use ab_adapters::FakeAgentAdapter;
use axum::Router;
use tempfile::TempDir;

use crate::config::Config;
use crate::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub agent: FakeAgentAdapter,
    _dir: TempDir,
}

pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        data_dir: dir.path().join("data"),
        log_dir: dir.path().join("logs"),
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        bearer_token: None,
        environment: "test".to_string(),
        max_concurrent_sessions: 4,
        admission_timeout: std::time::Duration::from_millis(200),
        pool_max_size: 4,
        pool_idle_ttl: std::time::Duration::from_secs(60),
        pool_min_generic: 0,
        pool_maintenance_interval: std::time::Duration::from_secs(3600),
        agent_command: "fake-agent".to_string(),
        workspace_dir: dir.path().join("workspace"),
        allowed_tools: None,
        disallowed_tools: None,
        mcp_config_path: None,
        task_max_age_hours: 24,
        task_maintenance_interval: std::time::Duration::from_secs(3600),
    };
    let agent = FakeAgentAdapter::new();
    let state = AppState::build(config, Arc::new(agent.clone())).expect("build app state");
    let router = crate::http::build_router(state.clone());
    TestApp { router, state, agent, _dir: dir }
}

/// Build a test app gated behind a bearer token, for auth-middleware tests.
pub fn build_authenticated_test_app(token: &str) -> TestApp {
    let mut app = build_test_app();
    let mut config = (*app.state.config).clone();
    config.bearer_token = Some(token.to_string());
    app.state.config = Arc::new(config);
    app.router = crate::http::build_router(app.state.clone());
    app
}
