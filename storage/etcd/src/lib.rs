//! Registry adapter for an etcd-style watched key/value store.
//!
//! Resources live under `/resource/<collection>/<id>`, each value a JSON
//! document rendered as a string. Snapshots are one recursive GET; change
//! events come from long-poll watches on the same subtree.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use nmos_query_core::error::RegistryError;
use nmos_query_core::registry::{EventStream, RegistryAdapter};
use nmos_query_proto::{ChangeEvent, ResourceKind, ResourceRecord};
use serde_json::Value;
use tracing::{debug, warn};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EtcdRegistry {
    base: String,
    client: reqwest::Client,
}

impl EtcdRegistry {
    pub fn new(host: &str, port: u16) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().build().map_err(RegistryError::request)?;
        Ok(EtcdRegistry { base: format!("http://{host}:{port}"), client })
    }

    fn keys_url(&self, suffix: &str) -> String {
        format!("{}/v2/keys/resource/?{}", self.base, suffix)
    }
}

#[async_trait]
impl RegistryAdapter for EtcdRegistry {
    async fn snapshot(&self, kind: Option<ResourceKind>) -> Result<Vec<ResourceRecord>, RegistryError> {
        let response = self
            .client
            .get(self.keys_url("recursive=true"))
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await
            .map_err(RegistryError::request)?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }
        let body: Value = response.json().await.map_err(RegistryError::request)?;

        let mut flat = Vec::new();
        flatten(&body, &mut flat);
        Ok(flat
            .into_iter()
            .filter_map(|(key, doc)| {
                let (found, _id) = parse_key(&key)?;
                (kind.is_none() || kind == Some(found)).then(|| ResourceRecord::new(found, doc))
            })
            .collect())
    }

    fn events(&self) -> EventStream {
        let client = self.client.clone();
        let base = self.base.clone();
        Box::pin(stream::unfold(
            WatchState { client, base, wait_index: None },
            |mut state| async move {
                loop {
                    let suffix = match state.wait_index {
                        Some(index) => format!("wait=true&recursive=true&waitIndex={index}"),
                        None => "wait=true&recursive=true".to_string(),
                    };
                    let url = format!("{}/v2/keys/resource/?{}", state.base, suffix);
                    let body: Value = match poll(&state.client, &url).await {
                        Ok(body) => body,
                        Err(err) => return Some((Err(err), state)),
                    };
                    if let Some(index) = next_wait_index(&body) {
                        state.wait_index = Some(index);
                    }
                    match decode_watch(&body) {
                        Some(event) => return Some((Ok(event), state)),
                        None => {
                            debug!("ignoring watch response with no resource change");
                            continue;
                        }
                    }
                }
            },
        ))
    }
}

struct WatchState {
    client: reqwest::Client,
    base: String,
    wait_index: Option<u64>,
}

async fn poll(client: &reqwest::Client, url: &str) -> Result<Value, RegistryError> {
    let response = client.get(url).send().await.map_err(RegistryError::request)?;
    if !response.status().is_success() {
        return Err(RegistryError::Status(response.status().as_u16()));
    }
    response.json().await.map_err(RegistryError::request)
}

/// `/resource/<collection>/<id>` → the collection and id.
fn parse_key(key: &str) -> Option<(ResourceKind, String)> {
    let mut segments = key.trim_matches('/').split('/');
    if segments.next() != Some("resource") {
        return None;
    }
    let kind = ResourceKind::from_collection(segments.next()?)?;
    let id = segments.next()?;
    segments.next().is_none().then(|| (kind, id.to_string()))
}

/// Collect every `(key, document)` leaf of a recursive etcd listing.
fn flatten(node: &Value, out: &mut Vec<(String, Value)>) {
    if let (Some(key), Some(value)) = (node.get("key").and_then(Value::as_str), node.get("value").and_then(Value::as_str)) {
        match serde_json::from_str(value) {
            Ok(doc) => out.push((key.to_string(), doc)),
            Err(err) => warn!(key, %err, "unparseable registry value"),
        }
    }
    for children in ["node", "nodes"] {
        match node.get(children) {
            Some(Value::Array(items)) => {
                for item in items {
                    flatten(item, out);
                }
            }
            Some(child @ Value::Object(_)) => flatten(child, out),
            _ => {}
        }
    }
}

/// One long-poll watch response → one change event, if it concerns a
/// registered resource.
fn decode_watch(body: &Value) -> Option<ChangeEvent> {
    let action = body.get("action").and_then(Value::as_str)?;
    let node = body.get("node")?;
    let key = node.get("key").and_then(Value::as_str)?;
    let (kind, id) = parse_key(key)?;

    let image = |container: &Value| {
        container
            .get("value")
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str(raw).ok())
    };
    let pre = body.get("prevNode").and_then(|prev| image(prev));

    match action {
        "set" | "create" | "update" | "compareAndSwap" => {
            let post = image(node)?;
            Some(ChangeEvent::set(kind, id, pre, post))
        }
        "delete" | "expire" | "compareAndDelete" => Some(ChangeEvent::delete(kind, id, pre)),
        _ => None,
    }
}

fn next_wait_index(body: &Value) -> Option<u64> {
    body.get("node")
        .and_then(|node| node.get("modifiedIndex"))
        .and_then(Value::as_u64)
        .map(|index| index + 1)
}
