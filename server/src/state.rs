use std::ops::Deref;
use std::sync::Arc;

use nmos_query_core::{QueryService, SubscriptionRegistry};
use nmos_query_proto::ApiVersion;

#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

pub struct AppStateInner {
    pub query: QueryService,
    pub subscriptions: SubscriptionRegistry,
    /// The API versions this deployment serves, oldest first.
    pub versions: Vec<ApiVersion>,
}

impl AppState {
    pub fn new(query: QueryService, subscriptions: SubscriptionRegistry, versions: Vec<ApiVersion>) -> Self {
        AppState(Arc::new(AppStateInner { query, subscriptions, versions }))
    }
}

impl Deref for AppState {
    type Target = AppStateInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
