use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::resource::ResourcePath;
use crate::version::ApiVersion;

pub const DEFAULT_UPDATE_RATE_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Derive the identity of a subscription from its normalized request.
    ///
    /// Two requests that normalize equal (same path, params, persistence and
    /// update rate, posted against the same API version) yield the same id
    /// within and across calls.
    pub fn derive(api_version: ApiVersion, request: &SubscriptionRequest) -> Self {
        let body = serde_json::to_string(request).unwrap_or_default();
        let name = format!("{}|{}", api_version, body);
        SubscriptionId(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SubscriptionId(Uuid::parse_str(s)?))
    }
}

/// The body of `POST /subscriptions`. Deserialization applies the documented
/// defaults, which is the normalization the identity hash is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub resource_path: ResourcePath,
    #[serde(default, deserialize_with = "de_params")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub persist: bool,
    #[serde(default = "default_update_rate")]
    pub max_update_rate_ms: u64,
}

fn default_update_rate() -> u64 {
    DEFAULT_UPDATE_RATE_MS
}

/// Filter params arrive as arbitrary JSON leaves but are matched as rendered
/// strings, so render them once at the boundary.
fn de_params<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, render_param(&v))).collect())
}

pub fn render_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A live subscription as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub ws_href: String,
    pub max_update_rate_ms: u64,
    pub persist: bool,
    pub resource_path: ResourcePath,
    pub params: BTreeMap<String, String>,
}

impl Subscription {
    pub fn from_request(id: SubscriptionId, ws_href: String, request: SubscriptionRequest) -> Self {
        Subscription {
            id,
            ws_href,
            max_update_rate_ms: request.max_update_rate_ms,
            persist: request.persist,
            resource_path: request.resource_path,
            params: request.params,
        }
    }

    /// The downgrade floor requested through the reserved
    /// `query.downgrade` param, if present and well-formed.
    pub fn downgrade_floor(&self) -> Option<ApiVersion> {
        self.params.get("query.downgrade").and_then(|v| v.parse().ok())
    }
}
