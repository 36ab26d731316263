//! Reconnecting with `Last-Event-ID` replays only what was missed, primed
//! with a synthetic `reconnected` status frame (second scenario of §8).

use crate::prelude::{parse_sse_with_ids, Daemon, ScriptedTurn};

fn assistant_text(text: &str) -> serde_json::Value {
    serde_json::json!({"type": "assistant", "content": [{"block_type": "text", "text": text}]})
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_reconnect_replays_only_events_after_the_cutoff() {
    let daemon = Daemon::builder()
        .turns(vec![ScriptedTurn {
            events: vec![assistant_text("first"), assistant_text("second")],
            result: serde_json::json!({"success": true, "output": "wrapped up"}),
            delay_before_result_ms: 0,
        }])
        .spawn();

    let client = reqwest::Client::new();
    let response = client
        .post(daemon.url("/execute"))
        .json(&serde_json::json!({"client_id": "bob", "request_id": "task-1", "prompt": "go"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    let frames = parse_sse_with_ids(&body);

    // Cut off after the first text block's `text_end` (the third durable
    // event: session, text_start, text_delta, text_end, ...).
    let cutoff = frames
        .iter()
        .find(|(_, kind, _)| kind == "text_end")
        .and_then(|(id, _, _)| *id)
        .expect("at least one text_end frame with an id");

    let reconnect_response = client
        .get(daemon.url("/tasks/bob/task-1/stream"))
        .header("last-event-id", cutoff.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(reconnect_response.status(), reqwest::StatusCode::OK);
    let reconnect_body = reconnect_response.text().await.unwrap();
    let reconnect_frames = parse_sse_with_ids(&reconnect_body);

    assert_eq!(reconnect_frames[0].1, "reconnected");
    assert_eq!(reconnect_frames[0].2["status"], "completed");

    let replayed_ids: Vec<u64> = reconnect_frames[1..].iter().filter_map(|(id, _, _)| *id).collect();
    assert!(replayed_ids.iter().all(|id| *id > cutoff), "replay must not repeat events up to {cutoff}, got {replayed_ids:?}");
    assert!(replayed_ids.windows(2).all(|w| w[0] < w[1]), "replayed ids must stay in order: {replayed_ids:?}");

    let kinds: Vec<&str> = reconnect_frames.iter().map(|(_, k, _)| k.as_str()).collect();
    assert!(kinds.contains(&"complete"), "reconnect stream should still end in complete, got {kinds:?}");
}
