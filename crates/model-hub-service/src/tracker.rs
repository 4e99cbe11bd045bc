//! Job lifecycle tracking
//!
//! Wraps an orchestration future with the persisted job state machine: claim,
//! run under the job deadline, then record completion or failure. Every
//! transition is its own compare-and-set write against the catalog.

use chrono::Utc;
use model_hub_core::{JobId, JobStatus};
use model_hub_db::{CatalogRepository, JobTransition};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::dto::JobOutcome;
use crate::error::{ServiceError, ServiceResult};

/// Runs job operations and records their lifecycle in the catalog
#[derive(Clone)]
pub struct JobTracker {
    catalog: Arc<dyn CatalogRepository>,
    job_timeout: Option<Duration>,
}

impl JobTracker {
    pub fn new(catalog: Arc<dyn CatalogRepository>, job_timeout: Option<Duration>) -> Self {
        Self {
            catalog,
            job_timeout,
        }
    }

    /// Running jobs last touched before this instant have lost their lease
    pub fn stale_before(&self) -> Option<chrono::DateTime<Utc>> {
        stale_before(self.job_timeout)
    }

    /// Claim `job_id`, run `operation` and record its outcome.
    ///
    /// Returns `JobAlreadyFinished` or `JobInProgress` without running the
    /// operation when the job cannot be claimed.
    #[instrument(skip(self, start_message, operation), fields(job_id = %job_id))]
    pub async fn run<T, F>(&self, job_id: &JobId, start_message: &str, operation: F) -> ServiceResult<T>
    where
        T: JobOutcome,
        F: Future<Output = ServiceResult<T>>,
    {
        let claimed = match self
            .catalog
            .claim_job(job_id, start_message, self.stale_before())
            .await?
        {
            Some(job) => job,
            None => {
                let job = self
                    .catalog
                    .find_job(job_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("job {}", job_id)))?;
                return Err(if job.status.is_terminal() {
                    ServiceError::JobAlreadyFinished(format!("job {} is {}", job_id, job.status))
                } else {
                    ServiceError::JobInProgress(format!("job {} is {}", job_id, job.status))
                });
            }
        };
        info!(kind = %claimed.kind, attempt = claimed.attempts, "Job started");

        let result = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(format!(
                    "job {} exceeded {}s",
                    job_id,
                    limit.as_secs()
                ))),
            },
            None => operation.await,
        };

        match result {
            Ok(outcome) => {
                let transition =
                    JobTransition::new(JobStatus::Running, JobStatus::Completed, outcome.summary())
                        .for_attempt(claimed.attempts);
                match self.catalog.transition_job(job_id, transition).await? {
                    Some(_) => info!("Job completed"),
                    None => warn!("Job lease lost before completion was recorded"),
                }
                Ok(outcome)
            }
            Err(err) => {
                let transition = JobTransition::new(
                    JobStatus::Running,
                    JobStatus::Failed,
                    format!("Error: {}", err),
                )
                .for_attempt(claimed.attempts);
                match self.catalog.transition_job(job_id, transition).await {
                    Ok(Some(_)) => warn!(error = %err, "Job failed"),
                    Ok(None) => warn!(error = %err, "Job lease lost before failure was recorded"),
                    Err(e) => warn!(error = %err, secondary = %e, "Failed to record job failure"),
                }
                Err(err)
            }
        }
    }
}

/// Lease cutoff for a job timeout; `None` disables reclaiming
pub fn stale_before(job_timeout: Option<Duration>) -> Option<chrono::DateTime<Utc>> {
    job_timeout
        .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
        .map(|timeout| Utc::now() - timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::SyncSummary;
    use crate::testing::catalog;
    use model_hub_core::{Job, JobPayload};

    fn sync_job() -> Job {
        Job::new(JobPayload::Sync {
            remote_id: "acme/tiny".to_string(),
        })
    }

    #[tokio::test]
    async fn test_success_records_summary() {
        let (catalog, _dir) = catalog().await;
        let job = catalog.create_job(sync_job()).await.unwrap();
        let tracker = JobTracker::new(catalog.clone(), Some(Duration::from_secs(60)));

        let summary = tracker
            .run(&job.id, &job.payload.start_message(), async {
                Ok(SyncSummary {
                    files_seen: 3,
                    artifacts_created: 1,
                    metadata_downloaded: 0,
                })
            })
            .await
            .unwrap();
        assert_eq!(summary.files_seen, 3);

        let stored = catalog.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempts, 1);
        let lines: Vec<&str> = stored.log.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Job queued",
                "Starting metadata sync for acme/tiny",
                "Synced 3 files, created 1 new artifacts, downloaded 0 metadata files",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_records_error() {
        let (catalog, _dir) = catalog().await;
        let job = catalog.create_job(sync_job()).await.unwrap();
        let tracker = JobTracker::new(catalog.clone(), None);

        let err = tracker
            .run::<SyncSummary, _>(&job.id, "Starting", async {
                Err(ServiceError::RegistryUnavailable("HTTP 503".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RegistryUnavailable(_)));

        let stored = catalog.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_message(), "Error: Registry unavailable: HTTP 503");
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let (catalog, _dir) = catalog().await;
        let job = catalog.create_job(sync_job()).await.unwrap();
        let tracker = JobTracker::new(catalog.clone(), Some(Duration::from_millis(20)));

        let err = tracker
            .run::<SyncSummary, _>(&job.id, "Starting", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(SyncSummary::default())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));

        let stored = catalog.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.last_message().starts_with("Error: Timed out"));
    }

    #[tokio::test]
    async fn test_finished_job_is_not_rerun() {
        let (catalog, _dir) = catalog().await;
        let job = catalog.create_job(sync_job()).await.unwrap();
        let tracker = JobTracker::new(catalog.clone(), None);
        tracker
            .run(&job.id, "Starting", async { Ok(SyncSummary::default()) })
            .await
            .unwrap();

        let mut ran = false;
        let err = tracker
            .run(&job.id, "Starting", async {
                ran = true;
                Ok(SyncSummary::default())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::JobAlreadyFinished(_)));
        assert!(!ran);

        let stored = catalog.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_running_job_under_lease_is_skipped() {
        let (catalog, _dir) = catalog().await;
        let job = catalog.create_job(sync_job()).await.unwrap();
        catalog.claim_job(&job.id, "other worker", None).await.unwrap();

        let tracker = JobTracker::new(catalog.clone(), Some(Duration::from_secs(3600)));
        let err = tracker
            .run(&job.id, "Starting", async { Ok(SyncSummary::default()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::JobInProgress(_)));
        assert!(err.is_duplicate_delivery());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (catalog, _dir) = catalog().await;
        let tracker = JobTracker::new(catalog, None);
        let err = tracker
            .run(&JobId::new(), "Starting", async { Ok(SyncSummary::default()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_stale_before() {
        assert!(stale_before(None).is_none());
        let cutoff = stale_before(Some(Duration::from_secs(60))).unwrap();
        assert!(cutoff < Utc::now());
    }
}
