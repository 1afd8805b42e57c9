use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::subscription::SubscriptionId;
use crate::time::Timestamp;

pub const GRAIN_DATA_TYPE: &str = "urn:x-nmos:format:data.event";

/// One outgoing WebSocket message: a batch of pre/post resource deltas.
#[derive(Debug, Clone, Serialize)]
pub struct Grain {
    pub grain_type: &'static str,
    pub source_id: Uuid,
    pub flow_id: SubscriptionId,
    pub origin_timestamp: Timestamp,
    pub sync_timestamp: Timestamp,
    pub creation_timestamp: Timestamp,
    pub grain: GrainPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrainPayload {
    #[serde(rename = "type")]
    pub data_type: &'static str,
    pub topic: String,
    pub data: Vec<GrainEntry>,
}

/// A single resource delta. A create carries no `pre`, a delete no `post`,
/// an update both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrainEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Value>,
}

impl Grain {
    /// Build a grain, stamping all three timestamps at emission time.
    pub fn new(source_id: Uuid, flow_id: SubscriptionId, topic: String, data: Vec<GrainEntry>) -> Self {
        let now = Timestamp::now();
        Grain {
            grain_type: "event",
            source_id,
            flow_id,
            origin_timestamp: now,
            sync_timestamp: now,
            creation_timestamp: now,
            grain: GrainPayload { data_type: GRAIN_DATA_TYPE, topic, data },
        }
    }
}
