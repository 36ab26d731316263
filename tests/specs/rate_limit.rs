//! A rate-limit window crossing 95% utilization fires exactly one
//! `credential_alert`, and the profile's tracked status is then visible
//! through the rate-limit endpoints (fifth scenario of §8).

use crate::prelude::{parse_sse, Daemon, ScriptedTurn};

fn rate_limit_event(utilization: f64) -> serde_json::Value {
    serde_json::json!({
        "type": "rate_limit",
        "rateLimitType": "five_hour",
        "utilization": utilization,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn crossing_95_percent_alerts_exactly_once_and_is_visible_afterwards() {
    let daemon = Daemon::builder()
        .turns(vec![ScriptedTurn {
            events: vec![rate_limit_event(0.94), rate_limit_event(0.96), rate_limit_event(0.97)],
            result: serde_json::json!({"success": true, "output": "done"}),
            delay_before_result_ms: 0,
        }])
        .spawn();

    let client = reqwest::Client::new();

    let save = client
        .post(daemon.url("/profiles/work"))
        .json(&serde_json::json!({"token": "abc", "subscriptionType": "pro"}))
        .send()
        .await
        .unwrap();
    assert_eq!(save.status(), reqwest::StatusCode::OK);
    let activate = client.post(daemon.url("/profiles/work/activate")).send().await.unwrap();
    assert_eq!(activate.status(), reqwest::StatusCode::OK);

    let response = client
        .post(daemon.url("/execute"))
        .json(&serde_json::json!({"client_id": "frank", "request_id": "task-1", "prompt": "go"}))
        .send()
        .await
        .unwrap();
    let body = response.text().await.unwrap();
    let frames = parse_sse(&body);

    let alerts: Vec<_> = frames.iter().filter(|(k, _)| k == "credential_alert").collect();
    assert_eq!(alerts.len(), 1, "expected exactly one alert across 0.94/0.96/0.97, got {alerts:?}");
    assert_eq!(alerts[0].1["active_profile"], "work");

    let debug_count = frames.iter().filter(|(k, _)| k == "debug").count();
    assert_eq!(debug_count, 3, "each rate_limit message should surface a debug frame");

    let status = client.get(daemon.url("/profiles/work/rate-limit")).send().await.unwrap();
    let status_body: serde_json::Value = status.json().await.unwrap();
    let five_hour = &status_body["windows"]["five_hour"];
    assert!((five_hour["utilization"].as_f64().unwrap() - 0.97).abs() < f64::EPSILON);
    assert_eq!(five_hour["alerted_95"], true);

    let all = client.get(daemon.url("/profiles/rate-limits")).send().await.unwrap();
    let all_body: serde_json::Value = all.json().await.unwrap();
    assert!(all_body.as_object().unwrap().contains_key("work"));
}
