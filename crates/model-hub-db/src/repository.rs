//! Repository trait abstractions for catalog persistence
//!
//! This module defines the CatalogRepository trait that abstracts database
//! operations on repositories, artifacts and jobs, allowing for different
//! implementations (SQLite, in-memory, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model_hub_core::{
    Artifact, ArtifactId, DownloadStatus, Job, JobId, JobStatus, Repository, RepositoryId,
    RepositoryStatus,
};

use crate::error::DbResult;

/// Default number of jobs returned by [`CatalogRepository::list_jobs`]
pub const DEFAULT_JOB_LIST_LIMIT: i64 = 50;

/// Result of fetching a file inline during sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMetadata {
    pub local_path: String,
    pub verified_at: DateTime<Utc>,
}

/// One artifact-level change produced by a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactChange {
    /// First observation of a path. If a concurrent sync inserted the same
    /// (repository, path) first, the existing row is refreshed instead.
    Created(Artifact),
    /// Existing artifact whose declared size and digest are refreshed
    Refreshed {
        id: ArtifactId,
        size_bytes: u64,
        content_hash: Option<String>,
        fetched: Option<FetchedMetadata>,
    },
}

/// Everything one sync writes, applied in a single transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncChangeset {
    pub repository_id: RepositoryId,
    pub status: RepositoryStatus,
    pub updated_at: DateTime<Utc>,
    pub changes: Vec<ArtifactChange>,
}

impl SyncChangeset {
    pub fn new(repository_id: RepositoryId) -> Self {
        Self {
            repository_id,
            status: RepositoryStatus::Synced,
            updated_at: Utc::now(),
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, change: ArtifactChange) {
        self.changes.push(change);
    }

    /// Number of artifacts this changeset intends to create
    pub fn created_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c, ArtifactChange::Created(_)))
            .count()
    }
}

/// Compare-and-set status change for a job already claimed by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    /// Appended to the job log as one line
    pub message: String,
    /// When set, only applies if the job's attempt counter still matches
    pub attempt: Option<u32>,
}

impl JobTransition {
    pub fn new(from: JobStatus, to: JobStatus, message: impl Into<String>) -> Self {
        Self {
            from,
            to,
            message: message.into(),
            attempt: None,
        }
    }

    /// Restrict the transition to the given claim
    pub fn for_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Repository trait for catalog persistence operations
///
/// Implementations must be thread-safe (Send + Sync) for use in async contexts.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert a newly registered repository
    ///
    /// # Returns
    /// * `Err(DbError::AlreadyExists)` - If the remote id is already registered
    async fn create_repository(&self, repository: Repository) -> DbResult<Repository>;

    /// Find a repository by its id
    async fn find_repository(&self, id: &RepositoryId) -> DbResult<Option<Repository>>;

    /// Find a repository by its remote id
    async fn find_repository_by_remote_id(&self, remote_id: &str)
        -> DbResult<Option<Repository>>;

    /// List all repositories, oldest first
    async fn list_repositories(&self) -> DbResult<Vec<Repository>>;

    /// Set a repository's status and bump its updated_at
    ///
    /// # Returns
    /// * `Err(DbError::NotFound)` - If no repository has that id
    async fn set_repository_status(
        &self,
        id: &RepositoryId,
        status: RepositoryStatus,
    ) -> DbResult<()>;

    /// Find an artifact by its id
    async fn find_artifact(&self, id: &ArtifactId) -> DbResult<Option<Artifact>>;

    /// Find an artifact by its owning repository and relative path
    async fn find_artifact_by_path(
        &self,
        repository_id: &RepositoryId,
        file_path: &str,
    ) -> DbResult<Option<Artifact>>;

    /// List the artifacts of a repository ordered by path
    async fn list_artifacts(&self, repository_id: &RepositoryId) -> DbResult<Vec<Artifact>>;

    /// Record a finished download: local path, content hash, Completed status
    /// and verification time. Size and classification keep what the last sync
    /// wrote, even when that sync ran during the download.
    ///
    /// # Returns
    /// * `Err(DbError::NotFound)` - If no artifact has that id
    async fn complete_download(
        &self,
        id: &ArtifactId,
        local_path: &str,
        content_hash: &str,
        verified_at: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Stamp an artifact's last successful verification
    async fn record_verification(&self, id: &ArtifactId, verified_at: DateTime<Utc>)
        -> DbResult<()>;

    /// Set an artifact's download status
    async fn set_download_status(&self, id: &ArtifactId, status: DownloadStatus) -> DbResult<()>;

    /// Apply every change of one sync and the repository status atomically
    async fn apply_sync(&self, changeset: SyncChangeset) -> DbResult<()>;

    /// Insert a new job
    async fn create_job(&self, job: Job) -> DbResult<Job>;

    /// Find a job by its id
    async fn find_job(&self, id: &JobId) -> DbResult<Option<Job>>;

    /// List jobs, most recent first
    async fn list_jobs(&self, limit: i64) -> DbResult<Vec<Job>>;

    /// Claim a job for execution: Pending -> Running, or Running -> Running when
    /// the job's updated_at is older than `stale_before`. Increments attempts.
    ///
    /// # Returns
    /// * `Ok(Some(Job))` - The claimed job
    /// * `Ok(None)` - If the job exists but is not claimable
    /// * `Err(DbError::NotFound)` - If no job has that id
    async fn claim_job(
        &self,
        id: &JobId,
        message: &str,
        stale_before: Option<DateTime<Utc>>,
    ) -> DbResult<Option<Job>>;

    /// Apply a compare-and-set status transition
    ///
    /// # Returns
    /// * `Ok(Some(Job))` - The updated job
    /// * `Ok(None)` - If the job was no longer in the expected state
    /// * `Err(DbError::Domain)` - If the transition violates the job state machine
    async fn transition_job(&self, id: &JobId, transition: JobTransition)
        -> DbResult<Option<Job>>;

    /// Jobs a worker could claim now, oldest first
    async fn claimable_jobs(
        &self,
        stale_before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> DbResult<Vec<Job>>;

    /// Health check - verify the catalog is reachable
    async fn health_check(&self) -> DbResult<()>;
}
