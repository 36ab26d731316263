//! A single `/execute` call streams straight through to completion and the
//! task is retrievable afterwards (first scenario of §8).

use crate::prelude::{parse_sse, Daemon, ScriptedTurn};

#[tokio::test(flavor = "multi_thread")]
async fn execute_streams_to_completion_and_task_is_then_retrievable() {
    let daemon = Daemon::builder()
        .turns(vec![ScriptedTurn::complete("all done")])
        .spawn();

    let client = reqwest::Client::new();
    let response = client
        .post(daemon.url("/execute"))
        .json(&serde_json::json!({
            "client_id": "alice",
            "request_id": "task-1",
            "prompt": "fix the bug",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/event-stream");

    let body = response.text().await.unwrap();
    let frames = parse_sse(&body);
    let kinds: Vec<&str> = frames.iter().map(|(k, _)| k.as_str()).collect();
    assert!(kinds.contains(&"complete"), "missing complete frame, got {kinds:?}");

    let complete = frames.iter().find(|(k, _)| k == "complete").unwrap();
    assert_eq!(complete.1["result"], "all done");

    let task = client.get(daemon.url("/tasks/alice/task-1")).send().await.unwrap();
    assert_eq!(task.status(), reqwest::StatusCode::OK);
    let task_body: serde_json::Value = task.json().await.unwrap();
    assert_eq!(task_body["status"], "completed");

    let ack = client.post(daemon.url("/tasks/alice/task-1/ack")).send().await.unwrap();
    assert_eq!(ack.status(), reqwest::StatusCode::OK);

    let gone = client.get(daemon.url("/tasks/alice/task-1")).send().await.unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
}
