//! Black-box coverage of the credential-profile HTTP surface: save,
//! activate, list, and delete all observable end-to-end through a real
//! daemon process.

use crate::prelude::Daemon;

#[tokio::test(flavor = "multi_thread")]
async fn profiles_round_trip_through_the_running_daemon() {
    let daemon = Daemon::builder().spawn();
    let client = reqwest::Client::new();

    for name in ["work", "personal"] {
        let response = client
            .post(daemon.url(&format!("/profiles/{name}")))
            .json(&serde_json::json!({"token": format!("token-{name}"), "subscriptionType": "pro"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let activate = client.post(daemon.url("/profiles/work/activate")).send().await.unwrap();
    assert_eq!(activate.status(), reqwest::StatusCode::OK);

    let list = client.get(daemon.url("/profiles")).send().await.unwrap();
    assert_eq!(list.status(), reqwest::StatusCode::OK);
    let profiles: Vec<serde_json::Value> = list.json().await.unwrap();
    assert_eq!(profiles.len(), 2);
    let work = profiles.iter().find(|p| p["name"] == "work").unwrap();
    assert_eq!(work["is_active"], true);

    let active = client.get(daemon.url("/profiles/active")).send().await.unwrap();
    let active_body: serde_json::Value = active.json().await.unwrap();
    assert_eq!(active_body["active"], "work");

    let delete = client.delete(daemon.url("/profiles/personal")).send().await.unwrap();
    assert_eq!(delete.status(), reqwest::StatusCode::OK);

    let get_deleted = client.get(daemon.url("/profiles/personal")).send().await.unwrap();
    assert_eq!(get_deleted.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn bearer_token_gates_protected_routes_end_to_end() {
    let daemon = Daemon::builder().bearer_token("topsecret").spawn();
    let client = reqwest::Client::new();

    let unauthenticated = client.get(daemon.url("/status")).send().await.unwrap();
    assert_eq!(unauthenticated.status(), reqwest::StatusCode::UNAUTHORIZED);

    let authenticated = client.get(daemon.url("/status")).bearer_auth("topsecret").send().await.unwrap();
    assert_eq!(authenticated.status(), reqwest::StatusCode::OK);

    let health = client.get(daemon.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
}
