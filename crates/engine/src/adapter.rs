// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine adapter (§4.E): wraps one logical agent run, acquiring a
//! runner from the pool, translating the agent's raw message stream into
//! the card-oriented SSE event taxonomy, and driving the pool
//! release-vs-discard decision.

use crate::pool::RunnerPool;
use ab_adapters::{AgentAdapter, AgentAdapterError, AgentSpawnConfig, InterventionSource};
use ab_core::{AgentRawEvent, AgentSessionId, ContentBlock, Event, RunnerSignal, ToolPolicy};
use ab_storage::{CredentialStore, RateLimitTracker};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const MAX_CONTEXT_TOKENS: u64 = 200_000;
const TOOL_INPUT_TRUNCATE_LEN: usize = 2000;

/// Everything the adapter needs to drive one run (§4.E `execute`).
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub resume_session_id: Option<AgentSessionId>,
    pub command: String,
    pub workspace_dir: PathBuf,
    pub tool_policy: ToolPolicy,
    pub mcp_config_path: Option<PathBuf>,
}

impl ExecuteRequest {
    fn options_fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.tool_policy.allowed_tools.hash(&mut hasher);
        self.tool_policy.disallowed_tools.hash(&mut hasher);
        self.tool_policy.use_mcp.hash(&mut hasher);
        self.mcp_config_path.hash(&mut hasher);
        hasher.finish()
    }

    fn spawn_config(&self) -> AgentSpawnConfig {
        AgentSpawnConfig {
            command: self.command.clone(),
            workspace_dir: self.workspace_dir.clone(),
            resume_session_id: self.resume_session_id.clone(),
            allowed_tools: self.tool_policy.allowed_tools.clone(),
            disallowed_tools: self.tool_policy.disallowed_tools.clone(),
            mcp_config_path: self.mcp_config_path.clone(),
            options_fingerprint: self.options_fingerprint(),
        }
    }
}

pub type SessionCallback = Arc<dyn Fn(AgentSessionId) + Send + Sync>;
pub type InterventionSentCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Translates one agent run into the SSE event taxonomy and manages pool
/// acquire/release (§4.E). Cheaply `Clone` (all fields are `Arc`s) so it
/// can be handed to a spawned background task per execution.
#[derive(Clone)]
pub struct EngineAdapter {
    factory: Arc<dyn AgentAdapter>,
    pool: Option<Arc<RunnerPool>>,
    rate_limiter: Option<Arc<RateLimitTracker>>,
    credentials: Option<Arc<CredentialStore>>,
}

impl EngineAdapter {
    pub fn new(factory: Arc<dyn AgentAdapter>, pool: Option<Arc<RunnerPool>>) -> Self {
        Self { factory, pool, rate_limiter: None, credentials: None }
    }

    /// Attach the rate-limit tracker and credential store so raw
    /// `rate_limit` messages can be translated into `debug` /
    /// `credential_alert` events (§7 "Rate limit").
    pub fn with_rate_limiting(mut self, tracker: Arc<RateLimitTracker>, credentials: Arc<CredentialStore>) -> Self {
        self.rate_limiter = Some(tracker);
        self.credentials = Some(credentials);
        self
    }

    /// Perform one logical run, returning a channel the caller drains for
    /// the translated event stream. The run itself proceeds on a spawned
    /// task so the caller never blocks on agent I/O.
    pub fn execute(
        &self,
        req: ExecuteRequest,
        interventions: Arc<dyn InterventionSource>,
        on_session: SessionCallback,
        on_intervention_sent: InterventionSentCallback,
    ) -> UnboundedReceiver<Event> {
        let (out_tx, out_rx) = unbounded_channel();
        let adapter = self.clone();
        tokio::spawn(async move {
            adapter.run_execute(req, interventions, on_session, on_intervention_sent, out_tx).await;
        });
        out_rx
    }

    async fn run_execute(
        &self,
        req: ExecuteRequest,
        interventions: Arc<dyn InterventionSource>,
        on_session: SessionCallback,
        on_intervention_sent: InterventionSentCallback,
        out_tx: UnboundedSender<Event>,
    ) {
        let spawn_config = req.spawn_config();

        let mut runner = match &self.pool {
            Some(pool) => match pool.acquire(req.resume_session_id.as_ref(), spawn_config.clone()).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = out_tx.send(Event::Error { message: e.to_string(), error_code: Some("agent_process".into()) });
                    return;
                }
            },
            None => match self.factory.spawn(spawn_config).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = out_tx.send(Event::Error { message: e.to_string(), error_code: Some("agent_process".into()) });
                    return;
                }
            },
        };

        let (sig_tx, mut sig_rx) = unbounded_channel::<RunnerSignal>();
        let mut state = CardState::default();
        let mut session_seen: Option<AgentSessionId> = runner.client_session_id();

        let run_fut = runner.run(&req.prompt, sig_tx, interventions);
        tokio::pin!(run_fut);

        let outcome_result = loop {
            tokio::select! {
                biased;
                Some(signal) = sig_rx.recv() => {
                    self.translate_signal(signal, &mut state, &out_tx, &on_session, &on_intervention_sent, &mut session_seen);
                }
                result = &mut run_fut => break result,
            }
        };
        while let Ok(signal) = sig_rx.try_recv() {
            self.translate_signal(signal, &mut state, &out_tx, &on_session, &on_intervention_sent, &mut session_seen);
        }

        match outcome_result {
            Ok(outcome) => {
                if let Some(used) = outcome.used_tokens {
                    let _ = out_tx.send(Event::ContextUsage {
                        used_tokens: used,
                        max_tokens: MAX_CONTEXT_TOKENS,
                        percent: (used as f64 / MAX_CONTEXT_TOKENS as f64) * 100.0,
                    });
                }
                // Emitted alongside `complete`/`error` below, not instead of
                // them: chat clients watch those, dashboard consumers watch
                // this one (§6 "alternate terminal event for dashboards").
                let _ = out_tx.send(Event::Result {
                    success: !outcome.is_failure(),
                    output: outcome.output.clone().unwrap_or_default(),
                    error: outcome.error.clone(),
                });

                if outcome.is_failure() {
                    let _ = out_tx.send(Event::Error {
                        message: outcome.error.clone().unwrap_or_else(|| "agent run failed".to_string()),
                        error_code: None,
                    });
                    if let Some(pool) = &self.pool {
                        pool.discard(runner).await;
                    }
                } else {
                    let result = outcome.output.clone().unwrap_or_default();
                    let session_id = outcome.session_id.clone().or(session_seen.clone());
                    let _ = out_tx.send(Event::Complete {
                        result,
                        claude_session_id: session_id.as_ref().map(|s| s.as_str().to_string()),
                        attachments: Vec::new(),
                    });
                    if let Some(pool) = &self.pool {
                        pool.release(runner, session_id).await;
                    }
                }
            }
            Err(e) => {
                let _ = out_tx.send(Event::Error { message: classify_error_message(&e), error_code: Some("agent_process".into()) });
                if let Some(pool) = &self.pool {
                    pool.discard(runner).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_signal(
        &self,
        signal: RunnerSignal,
        state: &mut CardState,
        out_tx: &UnboundedSender<Event>,
        on_session: &SessionCallback,
        on_intervention_sent: &InterventionSentCallback,
        session_seen: &mut Option<AgentSessionId>,
    ) {
        match signal {
            RunnerSignal::Session(session_id) => {
                if session_seen.is_none() {
                    *session_seen = Some(session_id.clone());
                    on_session(session_id.clone());
                }
                let _ = out_tx.send(Event::Session { session_id: session_id.as_str().to_string() });
            }
            RunnerSignal::Progress(text) => {
                let _ = out_tx.send(Event::Progress { text });
            }
            RunnerSignal::Compact { trigger, message } => {
                let _ = out_tx.send(Event::Compact { trigger, message });
            }
            RunnerSignal::InterventionInjected { text, user } => {
                on_intervention_sent(&user, &text);
                let _ = out_tx.send(Event::InterventionSent { user, text });
            }
            RunnerSignal::Raw(AgentRawEvent::Assistant { content }) => {
                for block in content {
                    self.translate_content_block(block, state, out_tx);
                }
            }
            RunnerSignal::Raw(AgentRawEvent::User { content }) => {
                for block in content {
                    if let ContentBlock::ToolResult { tool_use_id, content, is_error } = block {
                        let (card_id, tool_name) = tool_use_id
                            .as_deref()
                            .and_then(|id| state.tool_cards.get(id).cloned())
                            .unwrap_or_else(|| (state.current_card.clone(), state.last_tool_name.clone().unwrap_or_default()));
                        let _ = out_tx.send(Event::ToolResult {
                            card_id,
                            tool_name,
                            result: content,
                            is_error,
                            tool_use_id,
                        });
                    }
                }
            }
            RunnerSignal::Raw(AgentRawEvent::RateLimit { rate_limit_type, utilization, resets_at }) => {
                self.translate_rate_limit(rate_limit_type, utilization, resets_at, out_tx);
            }
            RunnerSignal::Raw(AgentRawEvent::System { .. } | AgentRawEvent::Result { .. } | AgentRawEvent::Unknown) => {
                // System/result messages are handled via their own signal
                // variants or the terminal outcome; unknown types are
                // swallowed per §7 "agent protocol".
            }
        }
    }

    fn translate_content_block(&self, block: ContentBlock, state: &mut CardState, out_tx: &UnboundedSender<Event>) {
        match block {
            ContentBlock::Text { text } => {
                let card_id = new_card_id();
                let _ = out_tx.send(Event::TextStart { card_id: card_id.clone() });
                let _ = out_tx.send(Event::TextDelta { card_id: card_id.clone(), text });
                let _ = out_tx.send(Event::TextEnd { card_id: card_id.clone() });
                state.current_card = Some(card_id);
            }
            ContentBlock::ToolUse { id, name, input } => {
                state.tool_cards.insert(id.clone(), (state.current_card.clone(), name.clone()));
                state.last_tool_name = Some(name.clone());
                let tool_input = truncate_tool_input(input);
                let _ = out_tx.send(Event::ToolStart {
                    card_id: state.current_card.clone(),
                    tool_name: name,
                    tool_input,
                    tool_use_id: Some(id),
                });
            }
            ContentBlock::ToolResult { .. } => {
                // Tool results only ever arrive on `user` messages (§3
                // AgentRawEvent), never embedded in `assistant` content.
            }
        }
    }

    fn translate_rate_limit(
        &self,
        rate_limit_type: String,
        utilization: serde_json::Value,
        resets_at: Option<String>,
        out_tx: &UnboundedSender<Event>,
    ) {
        let util_display = utilization.as_f64().map(|f| format!("{:.0}%", f * 100.0)).unwrap_or_else(|| "unknown".to_string());
        let _ = out_tx.send(Event::Debug {
            message: format!("rate limit {rate_limit_type}: utilization={util_display}"),
        });

        let (Some(tracker), Some(credentials)) = (&self.rate_limiter, &self.credentials) else {
            return;
        };
        let active_profile = credentials.get_active().ok().flatten();
        let resets_at = resets_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|dt| dt.with_timezone(&chrono::Utc));
        let notif = ab_storage::RateLimitNotification { rate_limit_type, utilization, resets_at };
        if let Some(alert) = tracker.record(active_profile.as_deref(), notif) {
            let _ = out_tx.send(Event::CredentialAlert { active_profile: alert.active_profile, profiles: alert.profiles });
        }
    }
}

#[derive(Default)]
struct CardState {
    current_card: Option<String>,
    /// `tool_use_id -> (card_id, tool_name)`, joining out-of-order
    /// `tool_result`s back to their originating card (§4.E.4).
    tool_cards: HashMap<String, (Option<String>, String)>,
    last_tool_name: Option<String>,
}

/// A short, UUID-derived card id grouping one text block with the tool
/// calls/results that follow it (§4.E.4, GLOSSARY "Card").
fn new_card_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn truncate_tool_input(input: serde_json::Value) -> serde_json::Value {
    let rendered = input.to_string();
    if rendered.len() > TOOL_INPUT_TRUNCATE_LEN {
        serde_json::json!({ "_truncated": rendered.len() })
    } else {
        input
    }
}

fn classify_error_message(e: &AgentAdapterError) -> String {
    match e {
        AgentAdapterError::UsageLimit => "usage limit".to_string(),
        AgentAdapterError::Authentication => "authentication".to_string(),
        AgentAdapterError::Network => "network".to_string(),
        AgentAdapterError::AbnormalTermination(_) => "abnormal termination".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
