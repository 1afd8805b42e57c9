//! The version ladder: rendering a resource registered at one API version as
//! an older one by forgetting the fields the older version had not defined.

use nmos_query_proto::{ApiVersion, ResourceKind};
use serde_json::Value;

const APIVERSION_KEY: &str = "@_apiversion";

/// Fields introduced at `version`, dropped when stepping below it.
fn introduced_fields(version: ApiVersion, kind: ResourceKind) -> &'static [&'static str] {
    use ResourceKind::*;
    match (version, kind) {
        (ApiVersion::V1_1, Nodes) => &["description", "tags", "api", "clocks"],
        (ApiVersion::V1_1, Devices) => &["description", "tags", "controls"],
        (ApiVersion::V1_1, Sources) => &["clock_name", "grain_rate", "channels"],
        (ApiVersion::V1_1, Flows) => &[
            "device_id",
            "grain_rate",
            "media_type",
            "sample_rate",
            "bit_depth",
            "DID_SDID",
            "frame_width",
            "frame_height",
            "interlace_mode",
            "colorspace",
            "components",
            "transfer_characteristic",
        ],
        (ApiVersion::V1_1, Receivers) => &["caps"],
        (ApiVersion::V1_2, Nodes) => &["interfaces"],
        (ApiVersion::V1_2, Senders) => &["interface_bindings", "caps", "subscription"],
        (ApiVersion::V1_2, Receivers) => &["interface_bindings"],
        (ApiVersion::V1_3, Nodes) => &["attached_network_device", "authorization"],
        (ApiVersion::V1_3, Devices) => &["authorization"],
        (ApiVersion::V1_3, Sources) => &["event_type"],
        (ApiVersion::V1_3, Flows) => &["event_type"],
        _ => &[],
    }
}

/// Drop every occurrence of `field`, at any depth.
fn strip_field(value: &mut Value, field: &str) {
    match value {
        Value::Object(map) => {
            map.remove(field);
            for child in map.values_mut() {
                strip_field(child, field);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_field(item, field);
            }
        }
        _ => {}
    }
}

/// The version a document claims to be registered at; absent means v1.0.
pub fn doc_version(doc: &Value) -> ApiVersion {
    doc.get(APIVERSION_KEY)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(ApiVersion::V1_0)
}

/// Downgrade `doc` to `target`, stepping down one minor version at a time and
/// removing the fields each step introduced.
///
/// A document already below `target` cannot be raised; it is returned
/// unchanged when the caller set a `floor` it still satisfies, otherwise it
/// is not representable at `target` and `None` is returned. `None` is also
/// returned for targets newer than the service understands.
pub fn downgrade(
    mut doc: Value,
    kind: ResourceKind,
    target: ApiVersion,
    floor: Option<ApiVersion>,
) -> Option<Value> {
    if target > ApiVersion::LATEST {
        return None;
    }

    let mut version = doc_version(&doc);
    if let Value::Object(map) = &mut doc {
        map.entry(APIVERSION_KEY).or_insert_with(|| Value::String(version.to_string()));
    }

    while version > target {
        for field in introduced_fields(version, kind) {
            strip_field(&mut doc, field);
        }
        let Some(prev) = version.pred() else { break };
        version = prev;
        if let Value::Object(map) = &mut doc {
            map.insert(APIVERSION_KEY.to_string(), Value::String(version.to_string()));
        }
    }

    if version == target {
        Some(doc)
    } else if floor.is_some_and(|floor| version >= floor) {
        Some(doc)
    } else {
        None
    }
}

/// Strip top-level internal annotations (`@_`-prefixed keys) before a
/// document leaves the service. Not recursive.
pub fn summarise(mut doc: Value) -> Value {
    if let Value::Object(map) = &mut doc {
        map.retain(|key, _| !key.starts_with("@_"));
    }
    doc
}
