//! With a pool capped at two runners, a third completed run evicts the
//! least-recently-used entry instead of growing past the cap (sixth
//! scenario of §8).

use crate::prelude::Daemon;

async fn run_to_completion(client: &reqwest::Client, daemon: &Daemon, request_id: &str) {
    let response = client
        .post(daemon.url("/execute"))
        .json(&serde_json::json!({"client_id": "grace", "request_id": request_id, "prompt": "go"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let _ = response.text().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_stays_at_max_size_and_counts_evictions() {
    let daemon = Daemon::builder().pool_max_size(2).pool_min_generic(0).spawn();
    let client = reqwest::Client::new();

    for i in 0..4 {
        run_to_completion(&client, &daemon, &format!("task-{i}")).await;
    }

    let status = client.get(daemon.url("/status")).send().await.unwrap();
    let body: serde_json::Value = status.json().await.unwrap();

    let total = body["pool"]["total"].as_u64().unwrap();
    assert!(total <= 2, "pool should never exceed max_size=2, got {total}");
    let evictions = body["pool"]["evictions"].as_u64().unwrap();
    assert!(evictions >= 2, "4 completed runs over a pool of 2 should have evicted at least twice, got {evictions}");
}
