//! Core domain models and types for the Model Hub
//!
//! This crate contains the data structures, enums, and pure domain logic that
//! describe repositories mirrored from a remote model registry, the artifacts
//! (files) they contain, content digests, and the asynchronous jobs that sync
//! and download them.

pub mod artifact;
pub mod checksum;
pub mod classify;
pub mod error;
pub mod job;
pub mod repository;
pub mod types;

// Re-exports for convenience
pub use artifact::{Artifact, RemoteFile};
pub use checksum::{ContentDigest, HashAlgorithm};
pub use classify::{classify, infer_format_and_precision, ModelFormat, Precision};
pub use error::{HubError, Result};
pub use job::{Job, JobMessage, JobPayload};
pub use repository::Repository;
pub use types::{
    ArtifactId, ArtifactType, DownloadStatus, JobId, JobKind, JobStatus, RepositoryId,
    RepositoryStatus,
};
