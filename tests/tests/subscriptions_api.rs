//! The /subscriptions surface: create-or-return, lookup, deletion.

mod common;

use common::*;
use serde_json::{json, Value};

#[tokio::test]
async fn posting_the_same_body_twice_returns_the_same_subscription() {
    let service = TestService::start().await;
    let client = reqwest::Client::new();
    let body = json!({"resource_path": "/", "params": {}, "persist": true, "max_update_rate_ms": 100});

    let first = client
        .post(service.url("/x-nmos/query/v1.3/subscriptions"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.unwrap();

    let second = client
        .post(service.url("/x-nmos/query/v1.3/subscriptions"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second: Value = second.json().await.unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["ws_href"], second["ws_href"]);
    let href = first["ws_href"].as_str().unwrap();
    assert!(href.starts_with(&format!("ws://{}/x-nmos/query/v1.3/ws/?uid=", service.addr)), "{href}");

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn defaults_are_reported_back() {
    let service = TestService::start().await;
    let created: Value = reqwest::Client::new()
        .post(service.url("/x-nmos/query/v1.0/subscriptions"))
        .json(&json!({"resource_path": "/nodes"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(created["max_update_rate_ms"], 100);
    assert_eq!(created["persist"], false);
    assert_eq!(created["params"], json!({}));
    assert_eq!(created["resource_path"], "/nodes");

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let service = TestService::start().await;
    let client = reqwest::Client::new();

    let garbage = client
        .post(service.url("/x-nmos/query/v1.2/subscriptions"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), 400);

    let wrong_path = client
        .post(service.url("/x-nmos/query/v1.2/subscriptions"))
        .json(&json!({"resource_path": "/potatoes"}))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_path.status(), 400);

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn lookup_and_listing() {
    let service = TestService::start().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(service.url("/x-nmos/query/v1.1/subscriptions"))
        .json(&json!({"resource_path": "/flows", "persist": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let fetched: Value = client
        .get(service.url(&format!("/x-nmos/query/v1.1/subscriptions/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched, created);

    let listed: Vec<Value> = client
        .get(service.url("/x-nmos/query/v1.1/subscriptions/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![created]);

    let missing = client
        .get(service.url("/x-nmos/query/v1.1/subscriptions/ef2a9916-e59e-11e7-b645-e37a6121621f"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn delete_is_idempotent_and_protection_is_respected() {
    let service = TestService::start().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(service.url("/x-nmos/query/v1.3/subscriptions"))
        .json(&json!({"resource_path": "/", "persist": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let deleted = client
        .delete(service.url(&format!("/x-nmos/query/v1.3/subscriptions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    // Absent now, but DELETE still reports success.
    let again = client
        .delete(service.url(&format!("/x-nmos/query/v1.3/subscriptions/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 204);

    let (protected, _) = service.subscriptions.post(
        ApiVersion::V1_3,
        serde_json::from_value(json!({"resource_path": "/", "persist": true, "params": {"label": "pinned"}})).unwrap(),
    );
    assert!(service.subscriptions.mark_protected(protected.id));
    let forbidden = client
        .delete(service.url(&format!("/x-nmos/query/v1.3/subscriptions/{}", protected.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    service.watcher.shutdown().await;
}
