//! Hub service
//!
//! The operations exposed to callers: registering repositories, submitting
//! sync and download jobs, and reading the catalog.

use async_trait::async_trait;
use model_hub_core::{
    Artifact, ArtifactId, Job, JobId, JobMessage, JobPayload, JobStatus, Repository,
};
use model_hub_db::{CatalogRepository, JobTransition, DEFAULT_JOB_LIST_LIMIT};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::dto::{RegisterRepositoryRequest, RegisterRepositoryResponse};
use crate::error::{ServiceError, ServiceResult};
use crate::queue::JobQueue;

/// Trait for hub operations
#[async_trait]
pub trait HubService: Send + Sync {
    /// Register a remote repository, optionally submitting a sync job
    async fn register_repository(
        &self,
        request: RegisterRepositoryRequest,
    ) -> ServiceResult<RegisterRepositoryResponse>;

    /// Submit a sync job for a registered repository
    async fn submit_sync(&self, remote_id: &str) -> ServiceResult<Job>;

    /// Submit a download job for a known artifact
    async fn submit_download(&self, artifact_id: &ArtifactId) -> ServiceResult<Job>;

    /// Get a job by id
    async fn get_job(&self, job_id: &JobId) -> ServiceResult<Job>;

    /// List jobs, most recent first
    async fn list_jobs(&self, limit: Option<i64>) -> ServiceResult<Vec<Job>>;

    async fn list_repositories(&self) -> ServiceResult<Vec<Repository>>;

    /// List the artifacts of a registered repository
    async fn list_artifacts(&self, remote_id: &str) -> ServiceResult<Vec<Artifact>>;

    async fn get_artifact(&self, artifact_id: &ArtifactId) -> ServiceResult<Artifact>;
}

/// Default implementation of HubService
pub struct DefaultHubService {
    catalog: Arc<dyn CatalogRepository>,
    queue: Arc<dyn JobQueue>,
}

impl DefaultHubService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, queue: Arc<dyn JobQueue>) -> Self {
        Self { catalog, queue }
    }

    /// Persist a Pending job, then publish it
    async fn submit(&self, payload: JobPayload) -> ServiceResult<Job> {
        let job = self.catalog.create_job(Job::new(payload)).await?;

        if let Err(err) = self.queue.enqueue(JobMessage::from(&job)).await {
            let transition = JobTransition::new(
                JobStatus::Pending,
                JobStatus::Failed,
                format!("Error: {}", err),
            );
            if let Err(e) = self.catalog.transition_job(&job.id, transition).await {
                warn!(job_id = %job.id, error = %e, "Failed to mark unqueued job as failed");
            }
            return Err(err);
        }

        info!(job_id = %job.id, kind = %job.kind, "Job submitted");
        Ok(job)
    }

    async fn repository_by_remote_id(&self, remote_id: &str) -> ServiceResult<Repository> {
        self.catalog
            .find_repository_by_remote_id(remote_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("repository {}", remote_id)))
    }
}

#[async_trait]
impl HubService for DefaultHubService {
    #[instrument(skip(self, request), fields(remote_id = %request.remote_id))]
    async fn register_repository(
        &self,
        request: RegisterRepositoryRequest,
    ) -> ServiceResult<RegisterRepositoryResponse> {
        let repository = Repository::new(request.vendor, request.name, request.remote_id)?;

        if self
            .catalog
            .find_repository_by_remote_id(&repository.remote_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "repository {} is already registered",
                repository.remote_id
            )));
        }

        let repository = self.catalog.create_repository(repository).await?;
        info!(repository = %repository.label(), "Repository registered");

        let sync_job = if request.auto_sync {
            Some(self.submit_sync(&repository.remote_id).await?)
        } else {
            None
        };

        Ok(RegisterRepositoryResponse {
            repository,
            sync_job,
        })
    }

    #[instrument(skip(self))]
    async fn submit_sync(&self, remote_id: &str) -> ServiceResult<Job> {
        let repository = self.repository_by_remote_id(remote_id).await?;
        self.submit(JobPayload::Sync {
            remote_id: repository.remote_id,
        })
        .await
    }

    #[instrument(skip(self), fields(artifact_id = %artifact_id))]
    async fn submit_download(&self, artifact_id: &ArtifactId) -> ServiceResult<Job> {
        let artifact = self.get_artifact(artifact_id).await?;
        self.submit(JobPayload::Download {
            artifact_id: artifact.id,
        })
        .await
    }

    async fn get_job(&self, job_id: &JobId) -> ServiceResult<Job> {
        self.catalog
            .find_job(job_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job {}", job_id)))
    }

    async fn list_jobs(&self, limit: Option<i64>) -> ServiceResult<Vec<Job>> {
        let limit = limit.unwrap_or(DEFAULT_JOB_LIST_LIMIT);
        if limit <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "limit must be positive, got {}",
                limit
            )));
        }
        Ok(self.catalog.list_jobs(limit).await?)
    }

    async fn list_repositories(&self) -> ServiceResult<Vec<Repository>> {
        Ok(self.catalog.list_repositories().await?)
    }

    async fn list_artifacts(&self, remote_id: &str) -> ServiceResult<Vec<Artifact>> {
        let repository = self.repository_by_remote_id(remote_id).await?;
        let artifacts = self.catalog.list_artifacts(&repository.id).await?;
        debug!(count = artifacts.len(), "Listed artifacts");
        Ok(artifacts)
    }

    async fn get_artifact(&self, artifact_id: &ArtifactId) -> ServiceResult<Artifact> {
        self.catalog
            .find_artifact(artifact_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("artifact {}", artifact_id)))
    }
}
