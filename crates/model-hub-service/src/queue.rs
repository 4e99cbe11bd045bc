//! Job queue transports
//!
//! Delivery is at-least-once: a message may reach more than one worker, and
//! the job tracker's compare-and-set claim decides which one runs it.

use async_trait::async_trait;
use model_hub_core::JobMessage;
use model_hub_db::CatalogRepository;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::tracker::stale_before;

/// Default delay between catalog polls when no job is claimable
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Transport between job submission and the workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a message for a job whose Pending row already exists
    async fn enqueue(&self, message: JobMessage) -> ServiceResult<()>;

    /// Wait for the next message. `None` means the queue is closed.
    async fn receive(&self) -> ServiceResult<Option<JobMessage>>;
}

/// In-process queue over a tokio channel
pub struct ChannelJobQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<JobMessage>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<JobMessage>>,
}

impl ChannelJobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Stop accepting messages; receivers drain what is queued, then get `None`
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl Default for ChannelJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, message: JobMessage) -> ServiceResult<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| ServiceError::Internal("job queue lock poisoned".to_string()))?
            .clone();
        let sender = sender.ok_or_else(|| ServiceError::Internal("job queue closed".to_string()))?;
        sender
            .send(message)
            .map_err(|_| ServiceError::Internal("job queue closed".to_string()))
    }

    async fn receive(&self) -> ServiceResult<Option<JobMessage>> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}

/// Queue backed by the catalog itself: a Pending job row is the message.
///
/// Workers poll for Pending jobs and for Running jobs whose lease expired, so
/// jobs survive process restarts.
pub struct CatalogJobQueue {
    catalog: Arc<dyn CatalogRepository>,
    poll_interval: Duration,
    job_timeout: Option<Duration>,
}

impl CatalogJobQueue {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            catalog,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: None,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Lease length; Running jobs older than this are delivered again
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

#[async_trait]
impl JobQueue for CatalogJobQueue {
    async fn enqueue(&self, message: JobMessage) -> ServiceResult<()> {
        debug!(job_id = %message.job_id, "Job persisted, awaiting poll");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn receive(&self) -> ServiceResult<Option<JobMessage>> {
        loop {
            let jobs = self
                .catalog
                .claimable_jobs(stale_before(self.job_timeout), 1)
                .await?;
            if let Some(job) = jobs.first() {
                return Ok(Some(JobMessage::from(job)));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
