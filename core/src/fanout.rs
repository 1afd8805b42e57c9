//! Turning one registry change into per-subscription grain entries.

use nmos_query_proto::{ChangeAction, ChangeEvent, GrainEntry};
use serde_json::Value;
use tracing::trace;

use crate::filter;
use crate::subscriptions::{FanoutTarget, SubscriptionRegistry};
use crate::version::{downgrade, summarise};

#[derive(Clone)]
pub struct FanOutEngine {
    subscriptions: SubscriptionRegistry,
}

impl FanOutEngine {
    pub fn new(subscriptions: SubscriptionRegistry) -> Self {
        FanOutEngine { subscriptions }
    }

    /// Evaluate one change against every subscription whose path covers it
    /// and queue the resulting deltas.
    pub fn handle_event(&self, event: &ChangeEvent) {
        if event.is_noop() {
            return;
        }
        // Snapshot of the interested subscriptions; the lock is not held
        // while grains are computed or delivered.
        let targets = self.subscriptions.targets_for(event.kind);
        trace!(kind = %event.kind, id = %event.id, targets = targets.len(), "fan-out");
        for target in targets {
            if let Some(entry) = delta_for(&target, event) {
                self.subscriptions.enqueue(target.id, vec![entry]);
            }
        }
    }
}

/// The pre/post images one subscription should see for this event, or `None`
/// when the change is invisible to it.
fn delta_for(target: &FanoutTarget, event: &ChangeEvent) -> Option<GrainEntry> {
    let view = |doc: &Option<Value>| {
        doc.clone()
            .and_then(|doc| downgrade(doc, event.kind, target.api_version, target.floor))
            .map(summarise)
    };
    let pre = view(&event.pre);
    let post = match event.action {
        ChangeAction::Set => view(&event.post),
        ChangeAction::Delete => None,
    };
    if pre.is_none() && post.is_none() {
        return None;
    }

    let pre_match = pre.as_ref().is_some_and(|doc| filter::matches(&target.params, doc));
    let post_match = post.as_ref().is_some_and(|doc| filter::matches(&target.params, doc));

    let entry = match (pre_match, post_match) {
        // Newly visible: a create, or an update that entered the filter.
        (false, true) => GrainEntry { path: event.id.clone(), pre: None, post },
        // No longer visible: a delete, or an update that left the filter.
        (true, false) => GrainEntry { path: event.id.clone(), pre, post: None },
        (true, true) => {
            if pre == post {
                return None;
            }
            GrainEntry { path: event.id.clone(), pre, post }
        }
        (false, false) => return None,
    };
    Some(entry)
}
