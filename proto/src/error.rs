use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed API version {0:?}")]
    ApiVersion(String),
    #[error("unknown resource collection {0:?}")]
    ResourceKind(String),
    #[error("malformed resource path {0:?}")]
    ResourcePath(String),
}
