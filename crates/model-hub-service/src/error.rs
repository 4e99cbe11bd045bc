//! Service-layer error types
//!
//! This module defines error types specific to the service layer,
//! mapping domain, database, registry and store errors to service-level errors.

use model_hub_core::HubError;
use model_hub_db::DbError;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::store::StoreError;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Repository, artifact or job not found in the catalog
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote registry unreachable or answered unexpectedly
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Remote registry reports the repository as absent
    #[error("Remote repository not found: {0}")]
    RemoteRepositoryNotFound(String),

    /// Fetching a file failed
    #[error("Download failed for {path}: {cause}")]
    DownloadFailed { path: String, cause: String },

    /// Moving a fetched file into the content store failed
    #[error("Store commit failed: {0}")]
    StoreCommitFailed(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Job already reached a terminal status
    #[error("Job already finished: {0}")]
    JobAlreadyFinished(String),

    /// Job is running under a live lease
    #[error("Job in progress: {0}")]
    JobInProgress(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the error only means the message was a duplicate delivery
    pub fn is_duplicate_delivery(&self) -> bool {
        matches!(
            self,
            ServiceError::JobAlreadyFinished(_) | ServiceError::JobInProgress(_)
        )
    }
}

impl From<HubError> for ServiceError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::RepositoryNotFound(msg)
            | HubError::ArtifactNotFound(msg)
            | HubError::JobNotFound(msg) => ServiceError::NotFound(msg),
            HubError::DuplicateRepository(msg) => ServiceError::Conflict(msg),
            HubError::InvalidDigest(msg) | HubError::ValidationError(msg) => {
                ServiceError::InvalidInput(msg)
            }
            HubError::InvalidValue { .. } => ServiceError::InvalidInput(err.to_string()),
            HubError::InvalidTransition { .. } | HubError::SerializationError(_) => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ServiceError::NotFound(msg),
            DbError::AlreadyExists(msg) | DbError::UniqueViolation(msg) => {
                ServiceError::Conflict(msg)
            }
            DbError::ConstraintViolation(msg) | DbError::ForeignKeyViolation(msg) => {
                ServiceError::InvalidInput(msg)
            }
            DbError::Domain(err) => ServiceError::from(err),
            other => ServiceError::Database(other.to_string()),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::RepositoryNotFound(msg) => ServiceError::RemoteRepositoryNotFound(msg),
            RegistryError::Unavailable(msg) => ServiceError::RegistryUnavailable(msg),
            RegistryError::DownloadFailed { path, cause } => {
                ServiceError::DownloadFailed { path, cause }
            }
            RegistryError::InvalidPath(path) => ServiceError::DownloadFailed {
                path,
                cause: "unsafe remote path".to_string(),
            },
            RegistryError::Configuration(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::StoreCommitFailed(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("Serialization error: {}", err))
    }
}
