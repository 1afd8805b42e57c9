//! Snapshot GETs against the full HTTP surface.

mod common;

use common::*;
use serde_json::{json, Value};

#[tokio::test]
async fn index_pages_enumerate_the_api() {
    let service = TestService::start().await;
    let client = reqwest::Client::new();

    let root: Value = client.get(service.url("/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(root, json!(["x-nmos/"]));

    let ns: Value = client.get(service.url("/x-nmos/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(ns, json!(["query/"]));

    let versions: Value = client.get(service.url("/x-nmos/query/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(versions, json!(["v1.0/", "v1.1/", "v1.2/", "v1.3/"]));

    let endpoints: Value = client.get(service.url("/x-nmos/query/v1.2/")).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        endpoints,
        json!(["subscriptions/", "nodes/", "devices/", "sources/", "flows/", "senders/", "receivers/"])
    );

    let missing = client.get(service.url("/x-nmos/query/v9.9/")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn senders_at_v1_3_come_back_whole() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Senders, sender_doc("1fe66652-e590-11e7-b23a-2796ce8be661")).unwrap();

    let docs: Vec<Value> = reqwest::Client::new()
        .get(service.url("/x-nmos/query/v1.3/senders/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let mut expected = sender_doc("1fe66652-e590-11e7-b23a-2796ce8be661");
    expected.as_object_mut().unwrap().remove("@_apiversion");
    assert_eq!(docs, vec![expected]);

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn v1_0_endpoint_downgrades_newer_documents() {
    let service = TestService::start().await;
    service
        .store
        .put(
            ResourceKind::Flows,
            json!({
                "@_apiversion": "v1.3",
                "id": "F",
                "format": "urn:x-nmos:format:video",
                "device_id": "D",
                "event_type": "E",
                "grain_rate": {"numerator": 25, "denominator": 1},
                "label": "",
                "parents": [],
                "source_id": "S",
                "tags": {},
                "version": "T",
                "description": "",
            }),
        )
        .unwrap();

    let docs: Vec<Value> = reqwest::Client::new()
        .get(service.url("/x-nmos/query/v1.0/flows/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        docs,
        vec![json!({
            "format": "urn:x-nmos:format:video",
            "label": "",
            "version": "T",
            "parents": [],
            "source_id": "S",
            "id": "F",
            "tags": {},
            "description": "",
        })]
    );

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn filters_and_verbose_mode() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Nodes, node_doc("n1", "studio")).unwrap();
    service.store.put(ResourceKind::Nodes, node_doc("n2", "gallery")).unwrap();
    let client = reqwest::Client::new();

    let filtered: Vec<Value> = client
        .get(service.url("/x-nmos/query/v1.3/nodes/?label=studio"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["id"], "n1");

    let ids: Vec<Value> = client
        .get(service.url("/x-nmos/query/v1.3/nodes/?verbose=false"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&json!("n1")) && ids.contains(&json!("n2")));

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn single_resource_lookup_and_conflicts() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Nodes, node_doc("X", "a node")).unwrap();
    let client = reqwest::Client::new();

    let doc: Value = client
        .get(service.url("/x-nmos/query/v1.3/nodes/X"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["id"], "X");

    let missing = client.get(service.url("/x-nmos/query/v1.3/nodes/Y")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    // The id exists, but as a node.
    let conflict = client.get(service.url("/x-nmos/query/v1.3/flows/X")).send().await.unwrap();
    assert_eq!(conflict.status(), 409);

    let unknown_collection = client.get(service.url("/x-nmos/query/v1.3/potatoes/")).send().await.unwrap();
    assert_eq!(unknown_collection.status(), 404);

    service.watcher.shutdown().await;
}
