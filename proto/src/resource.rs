use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::ParseError;

/// The six registered resource collections of IS-04.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Nodes,
    Devices,
    Sources,
    Flows,
    Senders,
    Receivers,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Nodes,
        ResourceKind::Devices,
        ResourceKind::Sources,
        ResourceKind::Flows,
        ResourceKind::Senders,
        ResourceKind::Receivers,
    ];

    /// The collection token used in URLs and registry keys, e.g. `"nodes"`.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Nodes => "nodes",
            ResourceKind::Devices => "devices",
            ResourceKind::Sources => "sources",
            ResourceKind::Flows => "flows",
            ResourceKind::Senders => "senders",
            ResourceKind::Receivers => "receivers",
        }
    }

    /// The singular name, e.g. `"node"`. The version downgrade table is keyed
    /// by these.
    pub fn singular(self) -> &'static str {
        match self {
            ResourceKind::Nodes => "node",
            ResourceKind::Devices => "device",
            ResourceKind::Sources => "source",
            ResourceKind::Flows => "flow",
            ResourceKind::Senders => "sender",
            ResourceKind::Receivers => "receiver",
        }
    }

    pub fn from_collection(token: &str) -> Option<ResourceKind> {
        ResourceKind::ALL.iter().copied().find(|k| k.collection() == token)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::from_collection(s).ok_or_else(|| ParseError::ResourceKind(s.to_string()))
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.collection())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A subscription or query scope: one collection, or all of them.
///
/// The wire form is `/` for all resources, or the collection token with a
/// leading slash (`/nodes`). Trailing slashes are accepted and normalized
/// away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePath {
    All,
    Kind(ResourceKind),
}

impl ResourcePath {
    pub fn covers(self, kind: ResourceKind) -> bool {
        match self {
            ResourcePath::All => true,
            ResourcePath::Kind(k) => k == kind,
        }
    }

    pub fn kind(self) -> Option<ResourceKind> {
        match self {
            ResourcePath::All => None,
            ResourcePath::Kind(k) => Some(k),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::All => f.write_str("/"),
            ResourcePath::Kind(k) => write!(f, "/{}", k.collection()),
        }
    }
}

impl FromStr for ResourcePath {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim_matches('/');
        if token.is_empty() {
            return Ok(ResourcePath::All);
        }
        ResourceKind::from_collection(token)
            .map(ResourcePath::Kind)
            .ok_or_else(|| ParseError::ResourcePath(s.to_string()))
    }
}

impl Serialize for ResourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One registered resource together with the collection it was found in.
///
/// Documents are opaque JSON trees; resource shapes drift between minor API
/// versions, so nothing here is schema-typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub doc: Value,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, doc: Value) -> Self {
        Self { kind, doc }
    }

    /// The document's `id` field, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.doc.get("id").and_then(Value::as_str)
    }
}
