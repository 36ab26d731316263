// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injected container of the server's core objects, shared via axum's
//! `State` extractor (§9 "Process-wide registry → injected container").

use std::sync::Arc;
use std::time::Duration;

use ab_adapters::{AgentAdapter, AgentSpawnConfig};
use ab_engine::{EngineAdapter, ExecutionDefaults, ResourceManager, RunnerPool, TaskManager};
use ab_storage::{CredentialStore, EventLog, RateLimitTracker, TaskStore};

use crate::config::Config;

/// Everything the HTTP handlers need, constructed once in `main` and
/// cheaply `Clone` (every field is an `Arc`) so axum can hand a copy to
/// each request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub task_manager: Arc<TaskManager>,
    pub engine: Arc<EngineAdapter>,
    pub resources: Arc<ResourceManager>,
    pub pool: Arc<RunnerPool>,
    pub credentials: Arc<CredentialStore>,
    pub rate_limiter: Arc<RateLimitTracker>,
    pub event_log: Arc<EventLog>,
}

impl AppState {
    /// Build every core component from `config` and the given agent
    /// transport factory (real `SubprocessAgentAdapter` in production, a
    /// `FakeAgentAdapter` in tests).
    pub fn build(config: Config, agent_factory: Arc<dyn AgentAdapter>) -> Result<Self, ab_storage::TaskStoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(ab_storage::TaskStoreError::Io)?;
        std::fs::create_dir_all(&config.workspace_dir).map_err(ab_storage::TaskStoreError::Io)?;

        let event_log = Arc::new(EventLog::new(config.data_dir.clone()));
        let task_store = Arc::new(TaskStore::new(config.data_dir.clone()));
        let credentials = Arc::new(CredentialStore::new(config.data_dir.clone()));
        let rate_limiter = Arc::new(RateLimitTracker::new(config.data_dir.clone()));
        let resources = Arc::new(ResourceManager::new(config.max_concurrent_sessions));
        let pool = RunnerPool::new(Arc::clone(&agent_factory), config.pool_max_size, config.pool_idle_ttl, config.pool_min_generic);

        let engine = Arc::new(EngineAdapter::new(agent_factory, Some(Arc::clone(&pool))).with_rate_limiting(Arc::clone(&rate_limiter), Arc::clone(&credentials)));

        let defaults = ExecutionDefaults {
            command: config.agent_command.clone(),
            workspace_dir: config.workspace_dir.clone(),
            mcp_config_path: config.mcp_config_path.clone(),
            admission_timeout: config.admission_timeout,
        };

        let task_manager = TaskManager::load(task_store, Some(Arc::clone(&event_log)), defaults)?;

        Ok(Self {
            config: Arc::new(config),
            task_manager,
            engine,
            resources,
            pool,
            credentials,
            rate_limiter,
            event_log,
        })
    }

    /// Default [`AgentSpawnConfig`] used for pool pre-warming (§4.D).
    pub fn default_spawn_config(&self) -> AgentSpawnConfig {
        AgentSpawnConfig {
            command: self.config.agent_command.clone(),
            workspace_dir: self.config.workspace_dir.clone(),
            resume_session_id: None,
            allowed_tools: self.config.allowed_tools.clone(),
            disallowed_tools: self.config.disallowed_tools.clone(),
            mcp_config_path: self.config.mcp_config_path.clone(),
            options_fingerprint: 0,
        }
    }

    pub fn start_background_tasks(&self) {
        self.pool.start_maintenance(self.config.pool_maintenance_interval, self.default_spawn_config());
        self.task_manager.start_maintenance(Duration::from_secs(60), self.config.task_max_age_hours);
    }

    pub async fn shutdown(&self) {
        self.task_manager.stop_maintenance();
        self.pool.stop_maintenance();
        let cancelled = self.task_manager.cancel_running_tasks(Duration::from_secs(10)).await;
        if cancelled > 0 {
            tracing::info!(cancelled, "cancelled in-flight tasks on shutdown");
        }
        self.task_manager.flush();
        let killed = self.pool.shutdown().await;
        tracing::info!(killed, "runner pool shut down");
    }
}
