//! Sending an intervention by the agent's own session id routes it to the
//! in-flight task and the run picks it up before completing (third
//! scenario of §8).

use crate::prelude::{parse_sse, Daemon, ScriptedTurn};

#[tokio::test(flavor = "multi_thread")]
async fn intervention_by_session_is_accepted_and_surfaces_on_the_stream() {
    let daemon = Daemon::builder()
        .session_id("sess-xyz")
        .turns(vec![ScriptedTurn::complete("done").with_delay_before_result(1_500)])
        .spawn();

    let client = reqwest::Client::new();
    let execute = {
        let client = client.clone();
        let url = daemon.url("/execute");
        tokio::spawn(async move {
            client
                .post(url)
                .json(&serde_json::json!({"client_id": "carol", "request_id": "task-1", "prompt": "go slow"}))
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        })
    };

    // Give the worker time to spawn the agent and record its session id
    // before the task's run completes.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let intervene_response = client
        .post(daemon.url("/sessions/sess-xyz/intervene"))
        .json(&serde_json::json!({"text": "please also check the tests", "user": "carol"}))
        .send()
        .await
        .unwrap();
    assert_eq!(intervene_response.status(), reqwest::StatusCode::ACCEPTED);
    let intervene_body: serde_json::Value = intervene_response.json().await.unwrap();
    assert_eq!(intervene_body["queue_position"], 1);

    let body = execute.await.unwrap();
    let frames = parse_sse(&body);
    let kinds: Vec<&str> = frames.iter().map(|(k, _)| k.as_str()).collect();
    assert!(kinds.contains(&"intervention_sent"), "expected an intervention_sent frame, got {kinds:?}");
    assert!(kinds.contains(&"complete"), "run should still reach completion, got {kinds:?}");

    let sent = frames.iter().find(|(k, _)| k == "intervention_sent").unwrap();
    assert_eq!(sent.1["user"], "carol");
    assert_eq!(sent.1["text"], "please also check the tests");
}

#[tokio::test(flavor = "multi_thread")]
async fn intervention_by_unknown_session_is_not_found() {
    let daemon = Daemon::builder().spawn();
    let client = reqwest::Client::new();
    let response = client
        .post(daemon.url("/sessions/no-such-session/intervene"))
        .json(&serde_json::json!({"text": "hello", "user": "dave"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
