//! Error types for the model hub domain

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Main error type for domain-level validation and state changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Repository not found
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Artifact not found
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A repository with the same remote id is already registered
    #[error("Repository already registered: {0}")]
    DuplicateRepository(String),

    /// Job status transition that would leave a terminal state or go backwards
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Digest string does not fit the algorithm
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Unknown enumeration value read back from storage or input
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl HubError {
    pub(crate) fn invalid_value(field: &'static str, value: impl Into<String>) -> Self {
        HubError::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::SerializationError(err.to_string())
    }
}
