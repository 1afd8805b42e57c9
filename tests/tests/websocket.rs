//! WebSocket delivery: on-connect baseline and change grains.

mod common;

use common::*;
use futures_util::StreamExt;
use nmos_query_proto::ChangeEvent;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn subscribe(service: &TestService, body: Value) -> Value {
    reqwest::Client::new()
        .post(service.url("/x-nmos/query/v1.3/subscriptions"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn next_grain<S>(stream: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a grain")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn connecting_yields_a_baseline_of_matching_resources() {
    let service = TestService::start().await;
    for (id, label) in [("n1", "a"), ("n2", "b"), ("n3", "c")] {
        service.store.put(ResourceKind::Nodes, node_doc(id, label)).unwrap();
    }

    let subscription = subscribe(&service, json!({"resource_path": "/nodes", "persist": true})).await;
    let (mut stream, _) = connect_async(subscription["ws_href"].as_str().unwrap()).await.unwrap();

    let grain = next_grain(&mut stream).await;
    assert_eq!(grain["grain_type"], "event");
    assert_eq!(grain["flow_id"], subscription["id"]);
    assert_eq!(grain["grain"]["topic"], "/nodes");
    let data = grain["grain"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    for entry in data {
        assert_eq!(entry["pre"], entry["post"]);
        assert!(entry["pre"].get("@_apiversion").is_none());
    }

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn unknown_uid_is_refused_before_upgrade() {
    let service = TestService::start().await;
    let url = format!("ws://{}/x-nmos/query/v1.3/ws/?uid=bfdc0ede-e59d-11e7-bb51-1bf30cb6760d", service.addr);
    assert!(connect_async(&url).await.is_err());

    let no_uid = format!("ws://{}/x-nmos/query/v1.3/ws/", service.addr);
    assert!(connect_async(&no_uid).await.is_err());

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn an_update_that_leaves_the_filter_reads_as_a_delete() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Nodes, node_doc("n1", "A")).unwrap();

    let subscription =
        subscribe(&service, json!({"resource_path": "/nodes", "persist": true, "params": {"label": "A"}})).await;
    let (mut stream, _) = connect_async(subscription["ws_href"].as_str().unwrap()).await.unwrap();

    let baseline = next_grain(&mut stream).await;
    assert_eq!(baseline["grain"]["data"].as_array().unwrap().len(), 1);

    // The watched store records no previous images, so drive the label
    // change through the fan-out with both sides attached.
    service.fanout.handle_event(&ChangeEvent::set(
        ResourceKind::Nodes,
        "n1",
        Some(node_doc("n1", "A")),
        node_doc("n1", "B"),
    ));

    // The poller may interleave a grain for the registration itself; the
    // one we are after is the filter exit, which carries no post image.
    loop {
        let grain = next_grain(&mut stream).await;
        let data = grain["grain"]["data"].as_array().unwrap();
        if let Some(entry) = data.iter().find(|entry| entry.get("post").is_none()) {
            assert_eq!(entry["pre"]["label"], "A");
            assert!(entry["pre"].get("@_apiversion").is_none());
            break;
        }
    }

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn deletes_flow_from_the_store_to_the_socket() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Senders, sender_doc("s1")).unwrap();

    let subscription = subscribe(&service, json!({"resource_path": "/senders", "persist": true})).await;
    let (mut stream, _) = connect_async(subscription["ws_href"].as_str().unwrap()).await.unwrap();

    let baseline = next_grain(&mut stream).await;
    assert_eq!(baseline["grain"]["data"].as_array().unwrap().len(), 1);

    service.store.remove(ResourceKind::Senders, "s1").unwrap();

    // The poller may first surface the registration itself; wait for the
    // grain that carries the removal.
    loop {
        let grain = next_grain(&mut stream).await;
        let data = grain["grain"]["data"].as_array().unwrap();
        if data.iter().any(|entry| entry.get("post").is_none()) {
            let entry = data.iter().find(|entry| entry.get("post").is_none()).unwrap();
            assert_eq!(entry["pre"]["id"], "s1");
            assert_eq!(entry["path"], "s1");
            break;
        }
    }

    service.watcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_attached_sockets() {
    let service = TestService::start().await;
    service.store.put(ResourceKind::Nodes, node_doc("n1", "a")).unwrap();

    let subscription = subscribe(&service, json!({"resource_path": "/nodes", "persist": true})).await;
    let (mut stream, _) = connect_async(subscription["ws_href"].as_str().unwrap()).await.unwrap();
    let _baseline = next_grain(&mut stream).await;

    service.watcher.shutdown().await;

    // Detach-all closed the grain queue; the server ends the socket.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
