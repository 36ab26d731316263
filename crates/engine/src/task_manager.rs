// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task manager (§4.F): owns the `(client_id, request_id) -> Task`
//! table and the `agent_session_id -> TaskKey` session index, multiplexes
//! SSE listeners, drives the background execution worker, and persists
//! task records with a debounced coalescing save.

use crate::adapter::{EngineAdapter, ExecuteRequest};
use crate::resource_manager::ResourceManager;
use ab_core::{AgentSessionId, ClientId, Event, RequestId, Task, TaskError, TaskKey, TaskStatus, ToolPolicy};
use ab_storage::{EventLog, TaskStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Static per-process agent launch settings the worker needs to build an
/// [`ExecuteRequest`] (§3 Config "agent launch settings").
#[derive(Debug, Clone)]
pub struct ExecutionDefaults {
    pub command: String,
    pub workspace_dir: PathBuf,
    pub mcp_config_path: Option<PathBuf>,
    /// Short timeout for the resource-manager admission check in
    /// `start_execution` (§4.F "Background worker behavior").
    pub admission_timeout: Duration,
}

/// Bound on each listener's event queue (§5 "Back-pressure").
const LISTENER_CAPACITY: usize = 256;

/// One event as delivered to a listener: the payload plus its durable log
/// id, if an event log is configured (§4.F worker step (c)).
#[derive(Debug, Clone)]
pub struct BroadcastEnvelope {
    pub event: Event,
    pub event_id: Option<u64>,
}

pub type Listener = Sender<BroadcastEnvelope>;

struct TaskEntry {
    task: Task,
    listeners: Vec<Listener>,
    interventions: VecDeque<ab_core::Intervention>,
    execution_handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        Self { task, listeners: Vec::new(), interventions: VecDeque::new(), execution_handle: None }
    }
}

#[derive(Default)]
struct TaskManagerState {
    tasks: HashMap<TaskKey, TaskEntry>,
    session_index: HashMap<AgentSessionId, TaskKey>,
}

/// Process-wide task table (§4.F). Constructed once and shared behind an
/// `Arc` (background workers and the maintenance loop hold clones).
pub struct TaskManager {
    state: Mutex<TaskManagerState>,
    store: Option<Arc<TaskStore>>,
    event_log: Option<Arc<EventLog>>,
    defaults: ExecutionDefaults,
    dirty: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(store: Option<Arc<TaskStore>>, event_log: Option<Arc<EventLog>>, defaults: ExecutionDefaults) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TaskManagerState::default()),
            store,
            event_log,
            defaults,
            dirty: AtomicBool::new(false),
            maintenance: Mutex::new(None),
        })
    }

    /// Load persisted tasks, rewriting any `RUNNING` record to `ERROR`
    /// ("interrupted by service restart") and persisting immediately
    /// (§4.F "Persistence").
    pub fn load(store: Arc<TaskStore>, event_log: Option<Arc<EventLog>>, defaults: ExecutionDefaults) -> Result<Arc<Self>, ab_storage::TaskStoreError> {
        let persisted = store.load()?;
        let manager = Self::new(Some(store), event_log, defaults);
        let mut any_recovered = false;
        {
            let mut state = manager.state.lock();
            for p in persisted {
                let mut task = Task::from_persisted(p);
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Error;
                    task.error = Some("interrupted by service restart".to_string());
                    task.completed_at = Some(chrono::Utc::now());
                    any_recovered = true;
                }
                state.tasks.insert(task.key(), TaskEntry::new(task));
            }
        }
        if any_recovered {
            manager.flush();
        }
        Ok(manager)
    }

    /// §4.F `create_task`.
    pub fn create_task(
        &self,
        client_id: impl Into<ClientId>,
        request_id: impl Into<RequestId>,
        prompt: String,
        resume_session_id: Option<AgentSessionId>,
        tool_policy: ToolPolicy,
    ) -> Result<Task, TaskError> {
        let client_id = client_id.into();
        let request_id = request_id.into();
        let key = TaskKey::new(client_id.clone(), request_id.clone());
        let mut state = self.state.lock();
        if let Some(existing) = state.tasks.get(&key) {
            if existing.task.status == TaskStatus::Running {
                return Err(TaskError::Conflict(key));
            }
        }
        let task = Task::new(client_id, request_id, prompt, resume_session_id, tool_policy);
        state.tasks.insert(key, TaskEntry::new(task.clone()));
        drop(state);
        self.mark_dirty();
        Ok(task)
    }

    /// §4.F `start_execution`. Idempotent: a task that already has a live
    /// worker is left alone rather than double-spawned.
    pub fn start_execution(self: &Arc<Self>, key: TaskKey, engine: Arc<EngineAdapter>, resources: Arc<ResourceManager>) {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.tasks.get_mut(&key) else { return };
            if entry.execution_handle.is_some() {
                return;
            }
            let manager = Arc::clone(self);
            let key2 = key.clone();
            entry.execution_handle = Some(tokio::spawn(async move {
                manager.run_worker(key2, engine, resources).await;
            }));
        }
    }

    async fn run_worker(self: Arc<Self>, key: TaskKey, engine: Arc<EngineAdapter>, resources: Arc<ResourceManager>) {
        let Some(guard) = resources.acquire(Some(self.defaults.admission_timeout)).await else {
            self.error_task(&key, "admission denied: too many concurrent sessions".to_string());
            self.clear_execution_handle(&key);
            return;
        };

        let (prompt, resume_session_id, tool_policy) = {
            let state = self.state.lock();
            match state.tasks.get(&key) {
                Some(entry) => (entry.task.prompt.clone(), entry.task.resume_session_id.clone(), entry.task.tool_policy.clone()),
                None => return,
            }
        };

        let request = ExecuteRequest {
            prompt,
            resume_session_id,
            command: self.defaults.command.clone(),
            workspace_dir: self.defaults.workspace_dir.clone(),
            tool_policy,
            mcp_config_path: self.defaults.mcp_config_path.clone(),
        };

        let interventions: Arc<dyn ab_adapters::InterventionSource> = Arc::new(TaskInterventionSource { manager: Arc::clone(&self), key: key.clone() });

        let manager_for_session = Arc::clone(&self);
        let key_for_session = key.clone();
        let on_session: crate::adapter::SessionCallback = Arc::new(move |session_id| {
            manager_for_session.record_session(&key_for_session, session_id);
        });
        let on_intervention_sent: crate::adapter::InterventionSentCallback = Arc::new(|_, _| {});

        let mut events = engine.execute(request, interventions, on_session, on_intervention_sent);

        while let Some(event) = events.recv().await {
            self.handle_worker_event(&key, event).await;
        }

        drop(guard);
        self.clear_execution_handle(&key);
    }

    async fn handle_worker_event(&self, key: &TaskKey, event: Event) {
        let terminal = event.is_terminal();
        let outcome_for_terminal = if terminal { Some(event.clone()) } else { None };

        // Append and snapshot the listener list under one critical section
        // so a concurrent `add_listener_reconnect` can never observe this
        // event as both replayed (already on disk) and delivered live
        // (already registered) — see that function's doc comment.
        let (listeners, event_id) = {
            let mut state = self.state.lock();
            if let Event::Progress { text } = &event {
                if let Some(entry) = state.tasks.get_mut(key) {
                    entry.task.last_progress_text = Some(text.clone());
                }
            }
            let event_id = self.event_log.as_ref().and_then(|log| log.append(&key.client_id.0, &key.request_id.0, event.clone()).ok());
            let listeners = match state.tasks.get(key) {
                Some(entry) => entry.listeners.clone(),
                None => return,
            };
            (listeners, event_id)
        };

        let envelope = BroadcastEnvelope { event, event_id };
        for listener in listeners {
            let _ = listener.send(envelope.clone()).await;
        }

        match outcome_for_terminal {
            Some(Event::Complete { result, .. }) => self.complete_task(key, result),
            Some(Event::Error { message, .. }) => self.error_task(key, message),
            _ => {}
        }
    }

    fn record_session(&self, key: &TaskKey, session_id: AgentSessionId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.tasks.get_mut(key) {
            entry.task.agent_session_id = Some(session_id.clone());
        }
        state.session_index.insert(session_id, key.clone());
        drop(state);
        self.mark_dirty();
    }

    /// §4.F `add_listener`. Returns the receiving half; the sender is kept
    /// internally and dropped when the task is acked or cleared.
    pub fn add_listener(&self, key: &TaskKey) -> Option<Receiver<BroadcastEnvelope>> {
        let mut state = self.state.lock();
        let entry = state.tasks.get_mut(key)?;
        let (tx, rx) = tokio::sync::mpsc::channel(LISTENER_CAPACITY);
        entry.listeners.push(tx);
        Some(rx)
    }

    /// Register a listener and immediately prime it with a synthetic
    /// `reconnected` event plus every durable record after `last_event_id`,
    /// so the HTTP re-attach handler (§6 `GET .../stream`) never needs to
    /// hold the paired sender itself.
    ///
    /// The replay read and the listener registration happen inside the
    /// *same* `state` critical section that [`Self::handle_worker_event`]
    /// uses to append a new record and snapshot the listener list. That
    /// gives every event a strict total order relative to this call: a
    /// record is either already on disk when our section runs (delivered
    /// here via replay, because our listener was not yet registered when
    /// it was broadcast) or appended after our section finished (delivered
    /// live, because our listener was registered before its broadcast
    /// snapshot was taken). No record can land in both, so reconnects never
    /// duplicate or reorder events ahead of `reconnected`.
    pub async fn add_listener_reconnect(&self, key: &TaskKey, last_event_id: Option<u64>) -> Option<Receiver<BroadcastEnvelope>> {
        let (tx, rx) = tokio::sync::mpsc::channel(LISTENER_CAPACITY);

        let (status, last_progress, replay) = {
            let mut state = self.state.lock();
            let entry = state.tasks.get_mut(key)?;
            let status = format!("{:?}", entry.task.status).to_lowercase();
            let last_progress = entry.task.last_progress_text.clone();
            let replay = last_event_id
                .and_then(|after| self.event_log.as_ref().map(|log| (log, after)))
                .map(|(log, after)| log.read_since(&key.client_id.0, &key.request_id.0, after).unwrap_or_default())
                .unwrap_or_default();
            entry.listeners.push(tx.clone());
            (status, last_progress, replay)
        };

        let _ = tx.send(BroadcastEnvelope { event: Event::Reconnected { status, last_progress }, event_id: None }).await;
        for record in replay {
            let _ = tx.send(BroadcastEnvelope { event: record.event, event_id: Some(record.id) }).await;
        }

        Some(rx)
    }

    /// §4.F `add_intervention`.
    pub fn add_intervention(&self, key: &TaskKey, text: String, user: String, attachment_paths: Vec<String>) -> Result<usize, TaskError> {
        let mut state = self.state.lock();
        let entry = state.tasks.get_mut(key).ok_or_else(|| TaskError::NotFound(key.to_string()))?;
        if entry.task.status != TaskStatus::Running {
            return Err(TaskError::NotRunning(key.to_string()));
        }
        entry.interventions.push_back(ab_core::Intervention { text, user, attachment_paths });
        Ok(entry.interventions.len())
    }

    /// §4.F `add_intervention_by_session`.
    pub fn add_intervention_by_session(&self, session_id: &AgentSessionId, text: String, user: String, attachment_paths: Vec<String>) -> Result<usize, TaskError> {
        let key = {
            let state = self.state.lock();
            state.session_index.get(session_id).cloned().ok_or_else(|| TaskError::NotFound(session_id.to_string()))?
        };
        self.add_intervention(&key, text, user, attachment_paths)
    }

    /// §4.F `get_intervention`: non-blocking pop.
    pub fn get_intervention(&self, key: &TaskKey) -> Option<ab_core::Intervention> {
        self.state.lock().tasks.get_mut(key)?.interventions.pop_front()
    }

    /// §4.F `complete_task`.
    pub fn complete_task(&self, key: &TaskKey, result: String) {
        let mut state = self.state.lock();
        if let Some(entry) = state.tasks.get_mut(key) {
            entry.task.status = TaskStatus::Completed;
            entry.task.result = Some(result);
            entry.task.completed_at = Some(chrono::Utc::now());
            if let Some(sid) = entry.task.agent_session_id.clone() {
                state.session_index.remove(&sid);
            }
        }
        drop(state);
        self.mark_dirty();
    }

    /// §4.F `error_task`.
    pub fn error_task(&self, key: &TaskKey, message: String) {
        let mut state = self.state.lock();
        if let Some(entry) = state.tasks.get_mut(key) {
            entry.task.status = TaskStatus::Error;
            entry.task.error = Some(message);
            entry.task.completed_at = Some(chrono::Utc::now());
            if let Some(sid) = entry.task.agent_session_id.clone() {
                state.session_index.remove(&sid);
            }
        }
        drop(state);
        self.mark_dirty();
    }

    /// §4.F `ack_task`.
    pub fn ack_task(&self, key: &TaskKey) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        let entry = state.tasks.remove(key).ok_or_else(|| TaskError::NotFound(key.to_string()))?;
        if let Some(sid) = entry.task.agent_session_id {
            state.session_index.remove(&sid);
        }
        drop(state);
        if let Some(log) = &self.event_log {
            log.cleanup_session(&key.client_id.0, &key.request_id.0);
        }
        self.mark_dirty();
        Ok(())
    }

    /// §4.F `mark_delivered`.
    pub fn mark_delivered(&self, key: &TaskKey) {
        if let Some(entry) = self.state.lock().tasks.get_mut(key) {
            entry.task.result_delivered = true;
        }
        self.mark_dirty();
    }

    pub fn get_task(&self, key: &TaskKey) -> Option<Task> {
        self.state.lock().tasks.get(key).map(|e| e.task.clone())
    }

    pub fn list_tasks(&self, client_id: &ClientId) -> Vec<Task> {
        self.state.lock().tasks.values().filter(|e| &e.task.client_id == client_id).map(|e| e.task.clone()).collect()
    }

    /// §4.F `cancel_running_tasks`: cancel every in-flight worker, waiting
    /// up to `timeout` in aggregate.
    pub async fn cancel_running_tasks(&self, timeout: Duration) -> usize {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state.tasks.values_mut().filter_map(|e| e.execution_handle.take()).collect()
        };
        let count = handles.len();
        for handle in &handles {
            handle.abort();
        }
        let _ = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        count
    }

    /// §4.F `cleanup_old_tasks`: remove terminal tasks older than the
    /// cutoff; reclaim orphaned `RUNNING` tasks (no live worker) first.
    pub fn cleanup_old_tasks(&self, max_age_hours: u64) -> usize {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(max_age_hours as i64);
        let mut state = self.state.lock();

        let orphan_keys: Vec<TaskKey> = state
            .tasks
            .iter()
            .filter(|(_, e)| e.task.status == TaskStatus::Running && e.execution_handle.as_ref().map(|h| h.is_finished()).unwrap_or(true))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &orphan_keys {
            if let Some(entry) = state.tasks.get_mut(key) {
                entry.task.status = TaskStatus::Error;
                entry.task.error = Some("interrupted by service restart".to_string());
                entry.task.completed_at = Some(chrono::Utc::now());
            }
        }

        let stale_keys: Vec<TaskKey> = state
            .tasks
            .iter()
            .filter(|(_, e)| e.task.status != TaskStatus::Running && e.task.completed_at.is_some_and(|c| c < cutoff))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = stale_keys.len();
        for key in &stale_keys {
            if let Some(entry) = state.tasks.remove(key) {
                if let Some(sid) = entry.task.agent_session_id {
                    state.session_index.remove(&sid);
                }
            }
        }
        drop(state);
        if !orphan_keys.is_empty() || removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    fn clear_execution_handle(&self, key: &TaskKey) {
        if let Some(entry) = self.state.lock().tasks.get_mut(key) {
            entry.execution_handle = None;
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Write the current task table to disk if dirty. Called by the
    /// debounce task and on shutdown.
    pub fn flush(&self) {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(store) = &self.store else { return };
        let persisted: Vec<_> = self.state.lock().tasks.values().map(|e| e.task.to_persisted()).collect();
        if let Err(e) = store.save(&persisted) {
            tracing::warn!(error = %e, "failed to persist task table");
        }
    }

    /// Spawn the debounced-save + cleanup maintenance loop (§9 "Debounced
    /// save"): every `interval`, flush if dirty and reap aged-out tasks.
    pub fn start_maintenance(self: &Arc<Self>, interval: Duration, max_age_hours: u64) {
        self.stop_maintenance();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.flush();
                manager.cleanup_old_tasks(max_age_hours);
            }
        });
        *self.maintenance.lock() = Some(handle);
    }

    pub fn stop_maintenance(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
    }
}

struct TaskInterventionSource {
    manager: Arc<TaskManager>,
    key: TaskKey,
}

#[async_trait]
impl ab_adapters::InterventionSource for TaskInterventionSource {
    async fn poll(&self) -> Option<ab_core::Intervention> {
        self.manager.get_intervention(&self.key)
    }
}

#[cfg(test)]
#[path = "task_manager_tests.rs"]
mod tests;
