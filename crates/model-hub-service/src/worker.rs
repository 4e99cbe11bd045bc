//! Worker pool
//!
//! A fixed number of tokio tasks pull messages from a [`JobQueue`] and run
//! them through the [`JobDispatcher`]. Shutdown stops workers from taking new
//! messages; a job already running is allowed to finish.

use model_hub_core::{JobMessage, JobPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::download::DownloadOrchestrator;
use crate::dto::JobOutcome;
use crate::error::ServiceResult;
use crate::queue::JobQueue;
use crate::sync::SyncOrchestrator;
use crate::tracker::JobTracker;

/// Pause after a queue error before polling again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Routes a job message to the orchestrator for its payload
pub struct JobDispatcher {
    tracker: JobTracker,
    sync: SyncOrchestrator,
    download: DownloadOrchestrator,
}

impl JobDispatcher {
    pub fn new(tracker: JobTracker, sync: SyncOrchestrator, download: DownloadOrchestrator) -> Self {
        Self {
            tracker,
            sync,
            download,
        }
    }

    /// Run one job to completion, returning its summary line
    pub async fn dispatch(&self, message: &JobMessage) -> ServiceResult<String> {
        let start_message = message.payload.start_message();
        match &message.payload {
            JobPayload::Sync { remote_id } => self
                .tracker
                .run(
                    &message.job_id,
                    &start_message,
                    self.sync.sync_repository(remote_id),
                )
                .await
                .map(|outcome| outcome.summary()),
            JobPayload::Download { artifact_id } => self
                .tracker
                .run(
                    &message.job_id,
                    &start_message,
                    self.download.download_artifact(artifact_id),
                )
                .await
                .map(|outcome| outcome.summary()),
        }
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    pub fn download(&self) -> &DownloadOrchestrator {
        &self.download
    }
}

/// Pool of workers consuming a job queue
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, dispatcher: Arc<JobDispatcher>, concurrency: usize) -> Self {
        Self {
            queue,
            dispatcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until `shutdown` is cancelled or the queue closes
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(concurrency = self.concurrency, "Worker pool starting");

        let handles: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                let queue = self.queue.clone();
                let dispatcher = self.dispatcher.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker_loop(worker, queue, dispatcher, shutdown).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    shutdown: CancellationToken,
) {
    debug!(worker, "Worker started");
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = queue.receive() => received,
        };

        match received {
            Ok(Some(message)) => {
                let job_id = message.job_id;
                match dispatcher.dispatch(&message).await {
                    Ok(summary) => info!(worker, %job_id, %summary, "Job finished"),
                    Err(e) if e.is_duplicate_delivery() => {
                        debug!(worker, %job_id, reason = %e, "Skipping duplicate delivery")
                    }
                    Err(e) => warn!(worker, %job_id, error = %e, "Job failed"),
                }
            }
            Ok(None) => {
                debug!(worker, "Queue closed");
                break;
            }
            Err(e) => {
                warn!(worker, error = %e, "Failed to receive job");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    debug!(worker, "Worker stopped");
}
