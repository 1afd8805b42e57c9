use nmos_query_proto::{ResourceKind, SubscriptionId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Request(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("registry returned status {0}")]
    Status(u16),
    #[error("malformed registry payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl RegistryError {
    pub fn request(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RegistryError::Request(Box::new(err))
    }

    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RegistryError::Storage(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("resource {0} not found")]
    NotFound(String),
    #[error("resource {id} is a {actual}, not a {requested}")]
    WrongKind { id: String, requested: ResourceKind, actual: ResourceKind },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("subscription {0} not found")]
    NotFound(SubscriptionId),
    #[error("subscription {0} may not be deleted")]
    Forbidden(SubscriptionId),
}
