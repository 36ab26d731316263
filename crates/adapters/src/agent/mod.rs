// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Runner`/`AgentAdapter` seam: a pool-held handle to a connected
//! agent subprocess, and the factory that spawns one (§3 "Runner", §4.G).

mod subprocess;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentAdapter, FakeRunner, ScriptedRun};

pub use subprocess::SubprocessAgentAdapter;

use ab_core::{AgentSessionId, Intervention, RunOutcome, RunnerSignal};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors from agent transport operations, classified per §7's "agent
/// process" / "agent protocol" taxonomy.
#[derive(Debug, Error)]
pub enum AgentAdapterError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("usage limit")]
    UsageLimit,
    #[error("authentication")]
    Authentication,
    #[error("network")]
    Network,
    #[error("abnormal termination: {0}")]
    AbnormalTermination(String),
    #[error("agent protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to launch the agent subprocess for one run (§4.G).
#[derive(Debug, Clone)]
pub struct AgentSpawnConfig {
    pub command: String,
    pub workspace_dir: PathBuf,
    pub resume_session_id: Option<AgentSessionId>,
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
    pub mcp_config_path: Option<PathBuf>,
    /// Hash of the tool policy + settings (§3 "options_fingerprint");
    /// a change forces the pool to rebuild rather than reuse a runner.
    pub options_fingerprint: u64,
}

/// Pull-style source of pending interventions, polled by the runner's
/// read loop on a 1s timer (§4.E "on_intervention", §5 "Cancellation").
#[async_trait]
pub trait InterventionSource: Send + Sync {
    async fn poll(&self) -> Option<Intervention>;
}

/// A connected agent subprocess plus its I/O handles, pooled for reuse
/// (§3 "Runner"). Ownership is exclusive: the pool holds idle runners,
/// a single in-flight `run()` call owns it during a run.
#[async_trait]
pub trait Runner: Send + Sync {
    fn runner_id(&self) -> &str;
    fn pid(&self) -> Option<u32>;
    fn client_session_id(&self) -> Option<AgentSessionId>;
    fn options_fingerprint(&self) -> u64;

    /// Connected and not mid-run.
    async fn is_idle(&self) -> bool;
    /// The subprocess has not exited.
    async fn is_cli_alive(&self) -> bool;

    /// Drive one logical run: write `prompt` as the next user turn, read
    /// and classify the agent's message stream until a terminal `result`,
    /// emitting `signals` along the way and polling `interventions` so a
    /// new user turn can be injected mid-run.
    async fn run(
        &mut self,
        prompt: &str,
        signals: UnboundedSender<RunnerSignal>,
        interventions: std::sync::Arc<dyn InterventionSource>,
    ) -> Result<RunOutcome, AgentAdapterError>;

    /// Terminate the subprocess; used by the pool's discard paths.
    async fn kill(&mut self);
}

/// Factory that spawns a connected [`Runner`].
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    async fn spawn(&self, config: AgentSpawnConfig) -> Result<Box<dyn Runner>, AgentAdapterError>;
}
