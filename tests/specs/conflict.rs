//! Calling `/execute` twice with the same client/request key while the
//! first run is still in flight is rejected with a `TASK_CONFLICT` (fourth
//! scenario of §8).

use crate::prelude::{Daemon, ScriptedTurn};

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_key_while_running_is_a_409_task_conflict() {
    let daemon = Daemon::builder().turns(vec![ScriptedTurn::complete("done").with_delay_before_result(1_000)]).spawn();

    let client = reqwest::Client::new();
    let first = {
        let client = client.clone();
        let url = daemon.url("/execute");
        tokio::spawn(async move {
            client
                .post(url)
                .json(&serde_json::json!({"client_id": "erin", "request_id": "task-1", "prompt": "first"}))
                .send()
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let second = client
        .post(daemon.url("/execute"))
        .json(&serde_json::json!({"client_id": "erin", "request_id": "task-1", "prompt": "second"}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::CONFLICT);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"]["code"], "TASK_CONFLICT");

    let first_response = first.await.unwrap();
    assert_eq!(first_response.status(), reqwest::StatusCode::OK);
    let _ = first_response.text().await.unwrap();
}
