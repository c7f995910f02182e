//! Error types for pipewright.

use thiserror::Error;

use crate::repository::ConfigurationState;
use crate::resource::ResourceKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("repository '{repository}' requires a build dependency of kind {kind}")]
    MissingBuildDependency {
        repository: String,
        kind: ResourceKind,
    },

    #[error("repository '{repository}' already has a build dependency of kind {kind}")]
    DuplicateDependency {
        repository: String,
        kind: ResourceKind,
    },

    #[error("repository '{repository}' is missing required field: {field}")]
    MissingField { repository: String, field: String },

    #[error("repository '{repository}': field '{field}' was already set")]
    FieldAlreadySet { repository: String, field: String },

    #[error("repository '{repository}' is {actual}, expected {expected}")]
    OutOfOrder {
        repository: String,
        expected: ConfigurationState,
        actual: ConfigurationState,
    },

    #[error("duplicate identifier in pipeline '{pipeline}': {identifier}")]
    DuplicateIdentifier { pipeline: String, identifier: String },

    #[error("pipeline '{0}' has already been configured")]
    AlreadyConfigured(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external service failed: {0}")]
    External(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Configuration errors abort the provisioning run; they are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingBuildDependency { .. }
                | Error::DuplicateDependency { .. }
                | Error::MissingField { .. }
                | Error::FieldAlreadySet { .. }
                | Error::OutOfOrder { .. }
                | Error::DuplicateIdentifier { .. }
                | Error::AlreadyConfigured(_)
                | Error::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
