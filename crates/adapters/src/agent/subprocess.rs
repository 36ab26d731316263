// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concrete `Runner`: a connected instance of the agent CLI
//! subprocess, speaking newline-delimited JSON over stdout/stdin (§4.G).

use super::{AgentAdapter, AgentAdapterError, AgentSpawnConfig, InterventionSource, Runner};
use ab_core::{AgentRawEvent, AgentSessionId, Intervention, RunOutcome, RunnerSignal};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc::UnboundedSender;

/// Spawns [`SubprocessRunner`]s.
#[derive(Debug, Clone, Default)]
pub struct SubprocessAgentAdapter;

#[async_trait]
impl AgentAdapter for SubprocessAgentAdapter {
    async fn spawn(&self, config: AgentSpawnConfig) -> Result<Box<dyn Runner>, AgentAdapterError> {
        let mut parts = config.command.split_whitespace();
        let program = parts.next().ok_or_else(|| AgentAdapterError::SpawnFailed("empty agent command".into()))?;
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(parts)
            .current_dir(&config.workspace_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(session_id) = &config.resume_session_id {
            cmd.arg("--resume").arg(session_id.as_str());
        }
        if let Some(tools) = &config.allowed_tools {
            cmd.arg("--allowed-tools").arg(tools.join(","));
        }
        if let Some(tools) = &config.disallowed_tools {
            cmd.arg("--disallowed-tools").arg(tools.join(","));
        }
        if let Some(path) = &config.mcp_config_path {
            cmd.arg("--mcp-config").arg(path);
        }

        let mut child = cmd.spawn().map_err(|e| AgentAdapterError::SpawnFailed(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| AgentAdapterError::SpawnFailed("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| AgentAdapterError::SpawnFailed("no stdout".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| AgentAdapterError::SpawnFailed("no stderr".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let capture = stderr_buf.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut buf = capture.lock();
                buf.push_str(&line);
                buf.push('\n');
            }
        });

        Ok(Box::new(SubprocessRunner {
            id: uuid::Uuid::new_v4().to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_buf,
            client_session_id: None,
            options_fingerprint: config.options_fingerprint,
        }))
    }
}

pub struct SubprocessRunner {
    id: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_buf: Arc<Mutex<String>>,
    client_session_id: Option<AgentSessionId>,
    options_fingerprint: u64,
}

impl SubprocessRunner {
    async fn write_turn(&mut self, text: &str) -> Result<(), AgentAdapterError> {
        let payload = serde_json::json!({
            "type": "user",
            "content": [{"block_type": "text", "text": text}],
        });
        let mut line = payload.to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Classify an unexpected end of the agent's message stream from its
    /// captured stderr text (§7 "agent process" taxonomy).
    async fn classify_exit(&mut self) -> AgentAdapterError {
        let status = self.child.wait().await.ok();
        let stderr = self.stderr_buf.lock().clone();
        let lower = stderr.to_lowercase();
        if lower.contains("usage limit") || lower.contains("rate limit") {
            AgentAdapterError::UsageLimit
        } else if lower.contains("auth") {
            AgentAdapterError::Authentication
        } else if lower.contains("network") || lower.contains("connection") {
            AgentAdapterError::Network
        } else {
            AgentAdapterError::AbnormalTermination(format!("exit={status:?} stderr={stderr}"))
        }
    }
}

#[async_trait]
impl Runner for SubprocessRunner {
    fn runner_id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
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
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn run(
        &mut self,
        prompt: &str,
        signals: UnboundedSender<RunnerSignal>,
        interventions: Arc<dyn InterventionSource>,
    ) -> Result<RunOutcome, AgentAdapterError> {
        self.write_turn(prompt).await?;

        let mut intervention_ticker = tokio::time::interval(Duration::from_secs(1));
        intervention_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut compact_deadline: Option<tokio::time::Instant> = None;

        loop {
            let compact_sleep = async {
                match compact_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let mut raw_line = String::new();
            tokio::select! {
                read = self.stdout.read_line(&mut raw_line) => {
                    let n = read?;
                    if n == 0 {
                        return Err(self.classify_exit().await);
                    }
                    compact_deadline = None;
                    let trimmed = raw_line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<AgentRawEvent>(trimmed) {
                        Ok(AgentRawEvent::System { session_id, subtype }) => {
                            if let Some(sid) = session_id {
                                if self.client_session_id.is_none() {
                                    let sid = AgentSessionId::new(sid);
                                    self.client_session_id = Some(sid.clone());
                                    let _ = signals.send(RunnerSignal::Session(sid));
                                }
                            }
                            if subtype.as_deref() == Some("compact_boundary") {
                                let _ = signals.send(RunnerSignal::Compact {
                                    trigger: "compact_boundary".to_string(),
                                    message: "agent is compacting context".to_string(),
                                });
                                compact_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(30));
                            }
                        }
                        Ok(AgentRawEvent::Result { success, output, error, is_error, session_id, usage }) => {
                            let session_id = session_id
                                .map(AgentSessionId::new)
                                .or_else(|| self.client_session_id.clone());
                            return Ok(RunOutcome {
                                success,
                                output,
                                error,
                                is_error,
                                session_id,
                                used_tokens: usage.map(|u| u.input_tokens + u.output_tokens),
                            });
                        }
                        Ok(AgentRawEvent::Unknown) => {
                            tracing::warn!(runner = %self.id, line = %trimmed, "skipping unknown agent message type");
                        }
                        Ok(event @ (AgentRawEvent::Assistant { .. } | AgentRawEvent::User { .. } | AgentRawEvent::RateLimit { .. })) => {
                            let _ = signals.send(RunnerSignal::Raw(event));
                        }
                        Err(e) => {
                            return Err(AgentAdapterError::Protocol(e.to_string()));
                        }
                    }
                }
                _ = intervention_ticker.tick() => {
                    if let Some(iv) = interventions.poll().await {
                        let formatted = format_intervention(&iv);
                        self.write_turn(&formatted).await?;
                        let _ = signals.send(RunnerSignal::InterventionInjected { text: iv.text, user: iv.user });
                    }
                }
                _ = compact_sleep, if compact_deadline.is_some() => {
                    // The compact produced no follow-up within the bound;
                    // treat it as a non-fatal empty continuation (§4.G).
                    return Ok(RunOutcome {
                        success: true,
                        output: Some(String::new()),
                        error: None,
                        is_error: false,
                        session_id: self.client_session_id.clone(),
                        used_tokens: None,
                    });
                }
            }
        }
    }

    async fn kill(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

fn format_intervention(iv: &Intervention) -> String {
    if iv.attachment_paths.is_empty() {
        format!("[{}]: {}", iv.user, iv.text)
    } else {
        format!("[{}]: {} (attachments: {})", iv.user, iv.text, iv.attachment_paths.join(", "))
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
