// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A scriptable [`Runner`]/[`AgentAdapter`] pair for unit and integration
//! tests elsewhere in the workspace, mirroring the scaffold's own
//! fake-adapter test-support convention.

use super::{AgentAdapter, AgentAdapterError, AgentSpawnConfig, InterventionSource, Runner};
use ab_core::{AgentSessionId, RunOutcome, RunnerSignal};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// A scripted outcome for one `run()` call.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub session_id: Option<String>,
    pub signals: Vec<RunnerSignal>,
    pub outcome: RunOutcome,
}

impl ScriptedRun {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            session_id: None,
            signals: Vec::new(),
            outcome: RunOutcome {
                success: true,
                output: Some(output.into()),
                error: None,
                is_error: false,
                session_id: None,
                used_tokens: Some(100),
            },
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            signals: Vec::new(),
            outcome: RunOutcome {
                success: false,
                output: None,
                error: Some(message.into()),
                is_error: true,
                session_id: None,
                used_tokens: None,
            },
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        let id = session_id.into();
        self.session_id = Some(id.clone());
        self.outcome.session_id = Some(AgentSessionId::new(id));
        self
    }

    pub fn with_signal(mut self, signal: RunnerSignal) -> Self {
        self.signals.push(signal);
        self
    }
}

/// Spawns [`FakeRunner`]s that replay a pre-scripted queue of runs.
#[derive(Clone, Default)]
pub struct FakeAgentAdapter {
    scripts: Arc<Mutex<VecDeque<ScriptedRun>>>,
    spawn_failures: Arc<Mutex<VecDeque<String>>>,
}

impl FakeAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.scripts.lock().push_back(run);
    }

    pub fn push_spawn_failure(&self, message: impl Into<String>) {
        self.spawn_failures.lock().push_back(message.into());
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    async fn spawn(&self, config: AgentSpawnConfig) -> Result<Box<dyn Runner>, AgentAdapterError> {
        if let Some(msg) = self.spawn_failures.lock().pop_front() {
            return Err(AgentAdapterError::SpawnFailed(msg));
        }
        Ok(Box::new(FakeRunner {
            id: uuid::Uuid::new_v4().to_string(),
            scripts: self.scripts.clone(),
            client_session_id: config.resume_session_id,
            options_fingerprint: config.options_fingerprint,
            alive: true,
        }))
    }
}

/// A runner whose `run()` replays whatever [`ScriptedRun`] is next in its
/// adapter's queue, falling back to a trivial success if none was queued.
pub struct FakeRunner {
    id: String,
    scripts: Arc<Mutex<VecDeque<ScriptedRun>>>,
    client_session_id: Option<AgentSessionId>,
    options_fingerprint: u64,
    alive: bool,
}

#[async_trait]
impl Runner for FakeRunner {
    fn runner_id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn client_session_id(&self) -> Option<AgentSessionId> {
        self.client_session_id.clone()
    }

    fn options_fingerprint(&self) -> u64 {
        self.options_fingerprint
    }

    async fn is_idle(&self) -> bool {
        true
    }

    async fn is_cli_alive(&self) -> bool {
        self.alive
    }

    async fn run(
        &mut self,
        _prompt: &str,
        signals: UnboundedSender<RunnerSignal>,
        _interventions: Arc<dyn InterventionSource>,
    ) -> Result<RunOutcome, AgentAdapterError> {
        let scripted = self.scripts.lock().pop_front();
        let run = scripted.unwrap_or_else(|| ScriptedRun::success("fake output"));
        if let Some(sid) = &run.session_id {
            let sid = AgentSessionId::new(sid.clone());
            self.client_session_id = Some(sid.clone());
            let _ = signals.send(RunnerSignal::Session(sid));
        }
        for signal in run.signals {
            let _ = signals.send(signal);
        }
        if run.outcome.is_failure() {
            self.alive = false;
        }
        Ok(run.outcome)
    }

    async fn kill(&mut self) {
        self.alive = false;
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
