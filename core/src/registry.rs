//! The seam between the query service and whatever actually stores the
//! registered resources.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use nmos_query_proto::{ChangeEvent, ResourceKind, ResourceRecord};

use crate::error::RegistryError;

/// A lazy, infinite, single-consumer sequence of registry mutations.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, RegistryError>> + Send>>;

/// Uniform interface to a backing registry store.
///
/// Implementations exist for a watched key/value store (long-poll) and for a
/// document store with per-document modification metadata (periodic polling).
#[async_trait]
pub trait RegistryAdapter: Send + Sync + 'static {
    /// A consistent point-in-time view of the registered resources,
    /// optionally restricted to one collection.
    async fn snapshot(&self, kind: Option<ResourceKind>) -> Result<Vec<ResourceRecord>, RegistryError>;

    /// Open a fresh stream of change events. The caller owns reconnection:
    /// after an `Err` item or end-of-stream it drops the stream and calls
    /// `events()` again.
    fn events(&self) -> EventStream;
}
