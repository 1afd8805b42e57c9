//! Query-string filter predicates: flat, case-sensitive equality of rendered
//! values at dotted paths into a resource document.

use std::collections::BTreeMap;

use nmos_query_proto::render_param;
use serde_json::Value;

/// Keys that shape the response rather than filter it.
const RESERVED: [&str; 3] = ["verbose", "query.downgrade", "query.rql"];

pub fn is_reserved(key: &str) -> bool {
    RESERVED.contains(&key) || key.starts_with("paging.")
}

/// Does `doc` satisfy every non-reserved `key=value` pair?
///
/// A key is a dotted path into the document; the document matches when the
/// value found there, rendered as a string, equals the supplied value. A
/// missing path never matches. No pairs means everything matches.
pub fn matches(params: &BTreeMap<String, String>, doc: &Value) -> bool {
    params
        .iter()
        .filter(|(key, _)| !is_reserved(key))
        .all(|(key, want)| lookup(doc, key).is_some_and(|found| render_param(found) == *want))
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, segment| node.get(segment))
}
