// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::EngineAdapter;
use ab_adapters::{FakeAgentAdapter, ScriptedRun};
use ab_core::{AgentRawEvent, ContentBlock, RunnerSignal, ToolPolicy};
use ab_storage::{EventLog, TaskStore};
use std::time::Duration;

fn defaults() -> ExecutionDefaults {
    ExecutionDefaults {
        command: "fake-agent".to_string(),
        workspace_dir: PathBuf::from("/tmp"),
        mcp_config_path: None,
        admission_timeout: Duration::from_secs(5),
    }
}

async fn wait_for<F: Fn() -> bool>(pred: F) {
    for _ in 0..200 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not become true in time");
}

#[tokio::test]
async fn create_task_conflicts_on_a_live_key() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "hi".to_string(), None, ToolPolicy::default())
        .expect("first create succeeds");

    let err = manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "hi again".to_string(), None, ToolPolicy::default())
        .expect_err("second create on a running task conflicts");
    assert!(matches!(err, TaskError::Conflict(_)));
}

#[tokio::test]
async fn create_task_after_completion_is_allowed() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "hi".to_string(), None, ToolPolicy::default())
        .expect("first create succeeds");
    manager.complete_task(&key, "done".to_string());

    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "hi again".to_string(), None, ToolPolicy::default())
        .expect("create after completion succeeds");
}

#[tokio::test]
async fn happy_path_execution_broadcasts_and_completes() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");

    let mut rx = manager.add_listener(&key).expect("listener");

    let factory = Arc::new(FakeAgentAdapter::new());
    factory.push_run(ScriptedRun::success("final answer").with_session("sess-1").with_signal(RunnerSignal::Raw(AgentRawEvent::Assistant {
        content: vec![ContentBlock::Text { text: "hi".to_string() }],
    })));
    let engine = Arc::new(EngineAdapter::new(factory, None));
    let resources = Arc::new(ResourceManager::new(4));

    manager.start_execution(key.clone(), engine, resources);

    let mut saw_complete = false;
    while let Some(envelope) = rx.recv().await {
        if matches!(envelope.event, Event::Complete { .. }) {
            saw_complete = true;
            break;
        }
    }
    assert!(saw_complete);

    wait_for(|| manager.get_task(&key).map(|t| t.status == TaskStatus::Completed).unwrap_or(false)).await;
    let task = manager.get_task(&key).expect("task still present until acked");
    assert_eq!(task.result.as_deref(), Some("final answer"));
    assert_eq!(task.agent_session_id.as_ref().map(|s| s.as_str()), Some("sess-1"));
}

#[tokio::test]
async fn failed_execution_error_taskes_and_frees_the_session_index() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");

    let factory = Arc::new(FakeAgentAdapter::new());
    factory.push_run(ScriptedRun::failure("boom").with_session("sess-err"));
    let engine = Arc::new(EngineAdapter::new(factory, None));
    let resources = Arc::new(ResourceManager::new(4));

    manager.start_execution(key.clone(), engine, resources);

    wait_for(|| manager.get_task(&key).map(|t| t.status == TaskStatus::Error).unwrap_or(false)).await;
    let task = manager.get_task(&key).expect("task present");
    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.error.is_some());
}

#[tokio::test]
async fn intervention_round_trips_through_the_queue() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");

    manager.add_intervention(&key, "keep going".to_string(), "alice".to_string(), vec![]).expect("queued");
    let popped = manager.get_intervention(&key).expect("intervention present");
    assert_eq!(popped.text, "keep going");
    assert_eq!(popped.user, "alice");
    assert!(manager.get_intervention(&key).is_none());
}

#[tokio::test]
async fn intervention_by_session_resolves_through_the_session_index() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");
    manager.record_session(&key, AgentSessionId::new("sess-1"));

    manager
        .add_intervention_by_session(&AgentSessionId::new("sess-1"), "nudge".to_string(), "bob".to_string(), vec![])
        .expect("resolved via session index");
    assert_eq!(manager.get_intervention(&key).expect("intervention").text, "nudge");
}

#[tokio::test]
async fn intervention_on_a_completed_task_is_rejected() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");
    manager.complete_task(&key, "done".to_string());

    let err = manager
        .add_intervention(&key, "too late".to_string(), "alice".to_string(), vec![])
        .expect_err("not running");
    assert!(matches!(err, TaskError::NotRunning(_)));
}

#[tokio::test]
async fn ack_removes_the_task_and_the_session_index_entry() {
    let manager = TaskManager::new(None, None, defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");
    manager.record_session(&key, AgentSessionId::new("sess-1"));
    manager.complete_task(&key, "done".to_string());

    manager.ack_task(&key).expect("ack");
    assert!(manager.get_task(&key).is_none());
    assert!(manager.ack_task(&key).is_err());
}

#[tokio::test]
async fn reconnect_replays_the_durable_log_after_last_event_id() {
    let root = tempfile::tempdir().expect("tempdir");
    let event_log = Arc::new(EventLog::new(root.path()));
    let manager = TaskManager::new(None, Some(event_log.clone()), defaults());
    let key = TaskKey::new("client-a", "req-1");
    manager
        .create_task(key.client_id.clone(), key.request_id.clone(), "say hi".to_string(), None, ToolPolicy::default())
        .expect("create");

    let first = event_log.append(&key.client_id.0, &key.request_id.0, Event::Progress { text: "one".to_string() }).expect("append");
    let _second = event_log.append(&key.client_id.0, &key.request_id.0, Event::Progress { text: "two".to_string() }).expect("append");

    let mut rx = manager.add_listener_reconnect(&key, Some(first)).await.expect("listener");
    drop(manager);

    let mut events = Vec::new();
    while let Some(envelope) = rx.recv().await {
        events.push(envelope);
    }
    assert!(matches!(events[0].event, Event::Reconnected { .. }));
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1].event, Event::Progress { text } if text == "two"));
}

#[tokio::test]
async fn cleanup_reclaims_orphaned_running_tasks_and_evicts_old_terminal_ones() {
    let manager = TaskManager::new(None, None, defaults());

    let orphan_key = TaskKey::new("client-a", "orphan");
    manager
        .create_task(orphan_key.client_id.clone(), orphan_key.request_id.clone(), "p".to_string(), None, ToolPolicy::default())
        .expect("create");

    let stale_key = TaskKey::new("client-a", "stale");
    manager
        .create_task(stale_key.client_id.clone(), stale_key.request_id.clone(), "p".to_string(), None, ToolPolicy::default())
        .expect("create");
    manager.complete_task(&stale_key, "done".to_string());
    if let Some(entry) = manager.state.lock().tasks.get_mut(&stale_key) {
        entry.task.completed_at = Some(chrono::Utc::now() - chrono::Duration::hours(999));
    }

    let removed = manager.cleanup_old_tasks(24);
    assert_eq!(removed, 1);
    assert!(manager.get_task(&stale_key).is_none());

    let orphan = manager.get_task(&orphan_key).expect("orphan still present");
    assert_eq!(orphan.status, TaskStatus::Error);
    assert_eq!(orphan.error.as_deref(), Some("interrupted by service restart"));
}

#[tokio::test]
async fn restart_recovery_marks_persisted_running_tasks_as_errored() {
    let root = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::new(root.path()));
    let persisted = ab_core::task::PersistedTask {
        client_id: "client-a".to_string(),
        request_id: "req-1".to_string(),
        prompt: "p".to_string(),
        status: TaskStatus::Running,
        resume_session_id: None,
        agent_session_id: None,
        result: None,
        error: None,
        result_delivered: false,
        created_at: chrono::Utc::now(),
        completed_at: None,
    };
    store.save(&[persisted]).expect("save");

    let manager = TaskManager::load(store, None, defaults()).expect("load");
    let key = TaskKey::new("client-a", "req-1");
    let task = manager.get_task(&key).expect("recovered task");
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.error.as_deref(), Some("interrupted by service restart"));
}
