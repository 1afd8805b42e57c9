//! Registry adapter backed by a sled database: a document store with
//! per-document modification metadata.
//!
//! Two trees: `registry` holds the current documents, `meta` holds
//! tombstones for deleted ones. Rows carry a `last_updated` stamp; change
//! events are produced by polling both trees for rows newer than a cursor,
//! so a fresh watcher replays everything modified within the configured
//! replay window. The store records no previous images, so updates surface
//! with an empty pre image.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use nmos_query_core::error::RegistryError;
use nmos_query_core::registry::{EventStream, RegistryAdapter};
use nmos_query_proto::{ChangeEvent, ResourceKind, ResourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REPLAY_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct SledRegistry {
    inner: Arc<Inner>,
    poll_interval: Duration,
    replay_window: Duration,
}

struct Inner {
    _db: sled::Db,
    registry: sled::Tree,
    meta: sled::Tree,
}

/// A current document plus its modification metadata.
#[derive(Serialize, Deserialize)]
struct Row {
    resource_type: ResourceKind,
    last_updated: u64,
    doc: Value,
}

/// What remains of a deleted document.
#[derive(Serialize, Deserialize)]
struct Tombstone {
    resource_type: ResourceKind,
    last_updated: u64,
    doc: Option<Value>,
}

impl SledRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let db = sled::open(path).map_err(RegistryError::storage)?;
        Self::with_db(db)
    }

    /// An in-memory store for tests.
    pub fn temporary() -> Result<Self, RegistryError> {
        let db = sled::Config::new()
            .temporary(true)
            .flush_every_ms(None)
            .open()
            .map_err(RegistryError::storage)?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self, RegistryError> {
        let registry = db.open_tree("registry").map_err(RegistryError::storage)?;
        let meta = db.open_tree("meta").map_err(RegistryError::storage)?;
        Ok(SledRegistry {
            inner: Arc::new(Inner { _db: db, registry, meta }),
            poll_interval: DEFAULT_POLL_INTERVAL,
            replay_window: DEFAULT_REPLAY_WINDOW,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_replay_window(mut self, replay_window: Duration) -> Self {
        self.replay_window = replay_window;
        self
    }

    /// Store or replace a document, stamping its modification time. The
    /// write surface exists for the registration side and for tests; the
    /// query API never calls it.
    pub fn put(&self, kind: ResourceKind, doc: Value) -> Result<(), RegistryError> {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::InvalidDocument("document has no id".to_string()))?
            .to_string();
        let row = Row { resource_type: kind, last_updated: now_nanos(), doc };
        let bytes = serde_json::to_vec(&row)?;
        self.inner.registry.insert(id.as_bytes(), bytes).map_err(RegistryError::storage)?;
        self.inner.meta.remove(id.as_bytes()).map_err(RegistryError::storage)?;
        Ok(())
    }

    /// Delete a document, leaving a tombstone carrying its last image.
    pub fn remove(&self, kind: ResourceKind, id: &str) -> Result<(), RegistryError> {
        let previous = self
            .inner
            .registry
            .remove(id.as_bytes())
            .map_err(RegistryError::storage)?
            .and_then(|bytes| serde_json::from_slice::<Row>(&bytes).ok())
            .map(|row| row.doc);
        let tombstone = Tombstone { resource_type: kind, last_updated: now_nanos(), doc: previous };
        let bytes = serde_json::to_vec(&tombstone)?;
        self.inner.meta.insert(id.as_bytes(), bytes).map_err(RegistryError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl RegistryAdapter for SledRegistry {
    async fn snapshot(&self, kind: Option<ResourceKind>) -> Result<Vec<ResourceRecord>, RegistryError> {
        let mut out = Vec::new();
        for item in self.inner.registry.iter() {
            let (key, bytes) = item.map_err(RegistryError::storage)?;
            let row: Row = match serde_json::from_slice(&bytes) {
                Ok(row) => row,
                Err(err) => {
                    warn!(key = %String::from_utf8_lossy(&key), %err, "unparseable registry row");
                    continue;
                }
            };
            if kind.is_none() || kind == Some(row.resource_type) {
                out.push(ResourceRecord::new(row.resource_type, row.doc));
            }
        }
        Ok(out)
    }

    fn events(&self) -> EventStream {
        let inner = self.inner.clone();
        let cursor = now_nanos().saturating_sub(self.replay_window.as_nanos() as u64);
        let poll_interval = self.poll_interval;
        Box::pin(stream::unfold(
            PollState { inner, cursor, poll_interval, queue: VecDeque::new(), polled_once: false },
            |mut state| async move {
                loop {
                    if let Some(event) = state.queue.pop_front() {
                        return Some((Ok(event), state));
                    }
                    if state.polled_once {
                        tokio::time::sleep(state.poll_interval).await;
                    }
                    state.polled_once = true;
                    let poll_time = now_nanos();
                    match scan(&state.inner, state.cursor) {
                        Ok(events) => {
                            state.queue = events;
                            state.cursor = poll_time;
                        }
                        Err(err) => return Some((Err(err), state)),
                    }
                }
            },
        ))
    }
}

struct PollState {
    inner: Arc<Inner>,
    cursor: u64,
    poll_interval: Duration,
    queue: VecDeque<ChangeEvent>,
    polled_once: bool,
}

/// One poll: `set` for registry rows newer than the cursor, `delete` for
/// tombstones newer than the cursor whose id has not come back.
fn scan(inner: &Inner, cursor: u64) -> Result<VecDeque<ChangeEvent>, RegistryError> {
    let mut events = VecDeque::new();

    for item in inner.registry.iter() {
        let (key, bytes) = item.map_err(RegistryError::storage)?;
        let Ok(row) = serde_json::from_slice::<Row>(&bytes) else { continue };
        if row.last_updated > cursor {
            let id = String::from_utf8_lossy(&key).into_owned();
            events.push_back(ChangeEvent::set(row.resource_type, id, None, row.doc));
        }
    }

    for item in inner.meta.iter() {
        let (key, bytes) = item.map_err(RegistryError::storage)?;
        let Ok(tombstone) = serde_json::from_slice::<Tombstone>(&bytes) else { continue };
        if tombstone.last_updated > cursor && !inner.registry.contains_key(&key).map_err(RegistryError::storage)? {
            let id = String::from_utf8_lossy(&key).into_owned();
            events.push_back(ChangeEvent::delete(tombstone.resource_type, id, tombstone.doc));
        }
    }

    Ok(events)
}

fn now_nanos() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX).max(0) as u64
}
