use thiserror::Error;

use crate::http::ApiError;

/// A contract violation detected locally, before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation error: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure to build an [`ArchZeroClient`](crate::ArchZeroClient). Operations
/// on a built client return their own component errors.
#[derive(Error, Debug)]
pub enum ArchZeroError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
