//! Snapshot GETs: fetch from the registry adapter, version-transform,
//! filter, summarise.

use std::collections::BTreeMap;
use std::sync::Arc;

use nmos_query_proto::{ApiVersion, ResourceKind, ResourcePath};
use serde_json::Value;

use crate::error::QueryError;
use crate::filter;
use crate::registry::RegistryAdapter;
use crate::version::{downgrade, summarise};

#[derive(Clone)]
pub struct QueryService {
    adapter: Arc<dyn RegistryAdapter>,
}

impl QueryService {
    pub fn new(adapter: Arc<dyn RegistryAdapter>) -> Self {
        QueryService { adapter }
    }

    /// Answer `GET /<type>/` (or `/` for everything): the filtered,
    /// downgraded, summarised documents, or bare ids when `verbose=false`.
    pub async fn get_resources(
        &self,
        api_version: ApiVersion,
        path: ResourcePath,
        args: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, QueryError> {
        let verbose = args.get("verbose").map(String::as_str) != Some("false");
        let docs = self.matching_snapshot(api_version, path, args).await?;
        if verbose {
            Ok(docs)
        } else {
            Ok(docs.into_iter().filter_map(|doc| doc.get("id").cloned()).collect())
        }
    }

    /// Answer `GET /<type>/<id>`.
    pub async fn get_resource(
        &self,
        api_version: ApiVersion,
        kind: ResourceKind,
        id: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<Value, QueryError> {
        let records = self.adapter.snapshot(None).await?;
        let floor = downgrade_floor(args);

        let mut elsewhere = None;
        for record in records {
            if record.id() != Some(id) {
                continue;
            }
            if record.kind != kind {
                elsewhere = Some(record.kind);
                continue;
            }
            let Some(doc) = downgrade(record.doc, kind, api_version, floor) else { continue };
            let doc = summarise(doc);
            if filter::matches(args, &doc) {
                return Ok(doc);
            }
        }
        match elsewhere {
            Some(actual) => Err(QueryError::WrongKind { id: id.to_string(), requested: kind, actual }),
            None => Err(QueryError::NotFound(id.to_string())),
        }
    }

    /// The resources currently visible to a scope at a version: shared by
    /// the list endpoint and the WebSocket on-connect sync.
    pub async fn matching_snapshot(
        &self,
        api_version: ApiVersion,
        path: ResourcePath,
        args: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, QueryError> {
        let records = self.adapter.snapshot(path.kind()).await?;
        let floor = downgrade_floor(args);

        let mut out = Vec::new();
        for record in records {
            let Some(doc) = downgrade(record.doc, record.kind, api_version, floor) else { continue };
            let doc = summarise(doc);
            if filter::matches(args, &doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

fn downgrade_floor(args: &BTreeMap<String, String>) -> Option<ApiVersion> {
    args.get("query.downgrade").and_then(|v| v.parse().ok())
}
