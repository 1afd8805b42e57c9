//! The set of live subscriptions and their attached WebSockets.
//!
//! This is the only shared mutable state in the service. Every operation is
//! serialized under one mutex; grain delivery happens on sender handles
//! cloned out of the lock so a slow peer can never stall the fan-out path.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nmos_query_proto::{
    ApiVersion, Grain, GrainEntry, ResourceKind, Subscription, SubscriptionId, SubscriptionRequest,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SubscriptionError;

pub struct SubscriptionConfig {
    /// Scheme and authority the returned `ws_href`s point at, e.g.
    /// `ws://192.168.0.23:8870`.
    pub ws_base: String,
    /// Stable per-process grain source id.
    pub source_id: Uuid,
    /// How long a non-persistent subscription survives with no WebSocket
    /// attached. Non-zero so a reconnecting client keeps its subscription.
    pub grace: Duration,
    /// Outgoing grain queue depth per attached WebSocket.
    pub queue_depth: usize,
}

impl SubscriptionConfig {
    pub fn new(ws_base: impl Into<String>, source_id: Uuid) -> Self {
        SubscriptionConfig {
            ws_base: ws_base.into(),
            source_id,
            grace: Duration::from_secs(3),
            queue_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentId(u64);

/// What `attach` hands to a WebSocket session: the subscription it joined
/// and the queue its grains arrive on. The queue closes when the
/// subscription is deleted, terminated as slow, or the service shuts down.
pub struct AttachedSocket {
    pub subscription: Subscription,
    pub api_version: ApiVersion,
    pub attachment: AttachmentId,
    pub grains: mpsc::Receiver<Grain>,
}

struct Attachment {
    id: AttachmentId,
    tx: mpsc::Sender<Grain>,
}

struct SubEntry {
    wire: Subscription,
    api_version: ApiVersion,
    protected: bool,
    attachments: Vec<Attachment>,
    next_attachment: u64,
    /// Bumped on every attach and detach; a grace timer only fires if the
    /// epoch it captured is still current.
    grace_epoch: u64,
    last_emit: Option<Instant>,
    pending: Option<Vec<GrainEntry>>,
}

impl SubEntry {
    fn senders(&self) -> Vec<mpsc::Sender<Grain>> {
        self.attachments.iter().map(|a| a.tx.clone()).collect()
    }
}

/// Everything the fan-out engine needs to evaluate one subscription against
/// a change event, cloned out from under the lock.
pub(crate) struct FanoutTarget {
    pub id: SubscriptionId,
    pub api_version: ApiVersion,
    pub floor: Option<ApiVersion>,
    pub params: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct SubscriptionRegistry(Arc<Inner>);

struct Inner {
    config: SubscriptionConfig,
    subs: Mutex<HashMap<SubscriptionId, SubEntry>>,
}

impl SubscriptionRegistry {
    pub fn new(config: SubscriptionConfig) -> Self {
        SubscriptionRegistry(Arc::new(Inner { config, subs: Mutex::new(HashMap::new()) }))
    }

    pub fn source_id(&self) -> Uuid {
        self.0.config.source_id
    }

    /// Create-or-return. Two requests that normalize equal map to the same
    /// subscription; the boolean reports whether this call created it.
    pub fn post(&self, api_version: ApiVersion, request: SubscriptionRequest) -> (Subscription, bool) {
        let id = SubscriptionId::derive(api_version, &request);
        let mut subs = self.0.subs.lock().unwrap();
        if let Some(existing) = subs.get(&id) {
            return (existing.wire.clone(), false);
        }
        let ws_href = format!("{}/x-nmos/query/{}/ws/?uid={}", self.0.config.ws_base, api_version, id);
        let wire = Subscription::from_request(id, ws_href, request);
        debug!(%id, path = %wire.resource_path, persist = wire.persist, "subscription created");
        subs.insert(
            id,
            SubEntry {
                wire: wire.clone(),
                api_version,
                protected: false,
                attachments: Vec::new(),
                next_attachment: 0,
                grace_epoch: 0,
                last_emit: None,
                pending: None,
            },
        );
        (wire, true)
    }

    pub fn get_all(&self) -> Vec<Subscription> {
        self.0.subs.lock().unwrap().values().map(|e| e.wire.clone()).collect()
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.0.subs.lock().unwrap().get(&id).map(|e| e.wire.clone())
    }

    /// Mark a subscription undeletable (service-created persistent
    /// subscriptions). Returns false when the id is unknown.
    pub fn mark_protected(&self, id: SubscriptionId) -> bool {
        let mut subs = self.0.subs.lock().unwrap();
        match subs.get_mut(&id) {
            Some(entry) => {
                entry.protected = true;
                true
            }
            None => false,
        }
    }

    /// Remove a subscription. `Ok(false)` when it did not exist; deleting a
    /// protected subscription is refused.
    pub fn delete(&self, id: SubscriptionId) -> Result<bool, SubscriptionError> {
        let mut subs = self.0.subs.lock().unwrap();
        match subs.get(&id) {
            None => Ok(false),
            Some(entry) if entry.protected => Err(SubscriptionError::Forbidden(id)),
            Some(_) => {
                // Dropping the entry drops every attachment sender, which
                // closes the per-socket queues and ends their write loops.
                subs.remove(&id);
                debug!(%id, "subscription deleted");
                Ok(true)
            }
        }
    }

    pub fn attach(&self, id: SubscriptionId) -> Result<AttachedSocket, SubscriptionError> {
        let mut subs = self.0.subs.lock().unwrap();
        let entry = subs.get_mut(&id).ok_or(SubscriptionError::NotFound(id))?;
        let (tx, rx) = mpsc::channel(self.0.config.queue_depth);
        let attachment = AttachmentId(entry.next_attachment);
        entry.next_attachment += 1;
        entry.grace_epoch += 1;
        entry.attachments.push(Attachment { id: attachment, tx });
        Ok(AttachedSocket {
            subscription: entry.wire.clone(),
            api_version: entry.api_version,
            attachment,
            grains: rx,
        })
    }

    pub fn detach(&self, id: SubscriptionId, attachment: AttachmentId) {
        let mut subs = self.0.subs.lock().unwrap();
        let Some(entry) = subs.get_mut(&id) else { return };
        entry.attachments.retain(|a| a.id != attachment);
        entry.grace_epoch += 1;
        if entry.attachments.is_empty() && !entry.wire.persist {
            let epoch = entry.grace_epoch;
            let registry = self.clone();
            let grace = self.0.config.grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                registry.expire(id, epoch);
            });
        }
    }

    /// Drop every attachment of every subscription. Used at shutdown so the
    /// WebSocket write loops all observe a closed queue and exit.
    pub fn detach_all(&self) {
        let mut subs = self.0.subs.lock().unwrap();
        for entry in subs.values_mut() {
            entry.attachments.clear();
            entry.grace_epoch += 1;
            entry.pending = None;
        }
    }

    fn expire(&self, id: SubscriptionId, epoch: u64) {
        let mut subs = self.0.subs.lock().unwrap();
        if let Some(entry) = subs.get(&id) {
            if entry.grace_epoch == epoch && entry.attachments.is_empty() && !entry.wire.persist {
                subs.remove(&id);
                debug!(%id, "non-persistent subscription expired");
            }
        }
    }

    pub(crate) fn targets_for(&self, kind: ResourceKind) -> Vec<FanoutTarget> {
        let subs = self.0.subs.lock().unwrap();
        subs.values()
            .filter(|entry| entry.wire.resource_path.covers(kind))
            .map(|entry| FanoutTarget {
                id: entry.wire.id,
                api_version: entry.api_version,
                floor: entry.wire.downgrade_floor(),
                params: entry.wire.params.clone(),
            })
            .collect()
    }

    /// Queue delta entries onto a subscription, honouring its update rate.
    ///
    /// Within a rate window entries coalesce into one pending grain that a
    /// timer flushes at the window boundary; outside it they go out at once.
    pub(crate) fn enqueue(&self, id: SubscriptionId, entries: Vec<GrainEntry>) {
        let mut to_send = None;
        let mut flush_in = None;
        {
            let mut subs = self.0.subs.lock().unwrap();
            let Some(entry) = subs.get_mut(&id) else { return };
            if let Some(pending) = &mut entry.pending {
                coalesce(pending, entries);
            } else {
                let rate = Duration::from_millis(entry.wire.max_update_rate_ms);
                let now = Instant::now();
                match entry.last_emit {
                    Some(last) if now.duration_since(last) < rate => {
                        let mut pending = Vec::new();
                        coalesce(&mut pending, entries);
                        entry.pending = Some(pending);
                        flush_in = Some(rate - now.duration_since(last));
                    }
                    _ => {
                        entry.last_emit = Some(now);
                        to_send = Some((entry.senders(), self.grain(entry, entries)));
                    }
                }
            }
        }
        if let Some(delay) = flush_in {
            let registry = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                registry.flush(id);
            });
        }
        if let Some((senders, grain)) = to_send {
            self.deliver(id, senders, grain);
        }
    }

    fn flush(&self, id: SubscriptionId) {
        let mut to_send = None;
        {
            let mut subs = self.0.subs.lock().unwrap();
            let Some(entry) = subs.get_mut(&id) else { return };
            let Some(mut entries) = entry.pending.take() else { return };
            // A burst that nets out to no change is not worth a grain.
            entries.retain(|e| e.pre != e.post);
            if entries.is_empty() {
                return;
            }
            entry.last_emit = Some(Instant::now());
            to_send = Some((entry.senders(), self.grain(entry, entries)));
        }
        if let Some((senders, grain)) = to_send {
            self.deliver(id, senders, grain);
        }
    }

    fn grain(&self, entry: &SubEntry, entries: Vec<GrainEntry>) -> Grain {
        Grain::new(self.0.config.source_id, entry.wire.id, entry.wire.resource_path.to_string(), entries)
    }

    fn deliver(&self, id: SubscriptionId, senders: Vec<mpsc::Sender<Grain>>, grain: Grain) {
        let mut slow = false;
        for tx in senders {
            match tx.try_send(grain.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => slow = true,
                // Receiver already gone; its session is tearing down.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        if slow {
            warn!(%id, "subscription queue full, terminating slow client");
            self.terminate_slow(id);
        }
    }

    fn terminate_slow(&self, id: SubscriptionId) {
        let mut subs = self.0.subs.lock().unwrap();
        let Some(entry) = subs.get_mut(&id) else { return };
        entry.attachments.clear();
        entry.grace_epoch += 1;
        entry.pending = None;
        if !entry.wire.persist {
            subs.remove(&id);
        }
    }
}

/// Merge new entries into a pending grain: per resource the oldest `pre` and
/// the newest `post` win, ordered by first occurrence.
fn coalesce(pending: &mut Vec<GrainEntry>, entries: Vec<GrainEntry>) {
    for entry in entries {
        match pending.iter_mut().find(|e| e.path == entry.path) {
            Some(existing) => existing.post = entry.post,
            None => pending.push(entry),
        }
    }
}
