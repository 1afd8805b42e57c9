#[allow(unused)]
pub use nmos_query_core::{
    subscriptions::SubscriptionConfig, ChangeWatcher, FanOutEngine, QueryService, RegistryAdapter,
    SubscriptionRegistry,
};
#[allow(unused)]
pub use nmos_query_proto::{ApiVersion, ResourceKind, ResourcePath};
#[allow(unused)]
pub use nmos_query_storage_sled::SledRegistry;

use nmos_query_server::{app, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// A full service over an in-memory document store, bound to an ephemeral
/// port: HTTP API, WebSocket endpoint, change watcher, the lot.
pub struct TestService {
    pub addr: SocketAddr,
    pub store: SledRegistry,
    pub subscriptions: SubscriptionRegistry,
    pub fanout: FanOutEngine,
    pub watcher: ChangeWatcher,
}

impl TestService {
    pub async fn start() -> Self {
        let store = SledRegistry::temporary()
            .unwrap()
            .with_poll_interval(Duration::from_millis(20));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let subscriptions = SubscriptionRegistry::new(SubscriptionConfig::new(
            format!("ws://{addr}"),
            nmos_query_server::source_id(),
        ));
        let adapter: Arc<dyn RegistryAdapter> = Arc::new(store.clone());
        let query = QueryService::new(adapter.clone());
        let fanout = FanOutEngine::new(subscriptions.clone());
        let watcher = ChangeWatcher::spawn(adapter, fanout.clone(), subscriptions.clone());

        let state = AppState::new(query, subscriptions.clone(), ApiVersion::ALL.to_vec());
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });

        TestService { addr, store, subscriptions, fanout, watcher }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub fn node_doc(id: &str, label: &str) -> Value {
    json!({
        "@_apiversion": "v1.3",
        "id": id,
        "label": label,
        "href": format!("http://192.168.0.23/{id}/"),
        "version": "1513150539:243021544",
        "interfaces": [],
        "api": {"endpoints": [], "versions": ["v1.0", "v1.1", "v1.2", "v1.3"]},
    })
}

pub fn sender_doc(id: &str) -> Value {
    json!({
        "@_apiversion": "v1.3",
        "id": id,
        "flow_id": "b30ebee2-e578-11e7-a01e-ab8cee26a3ae",
        "label": "rtp tx",
        "transport": "urn:x-nmos:transport:rtp.mcast",
        "interface_bindings": ["eth0"],
        "subscription": {"active": true, "receiver_id": null},
        "tags": {},
        "version": "1455208097:709538048",
    })
}
