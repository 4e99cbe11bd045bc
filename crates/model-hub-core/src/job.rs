//! Asynchronous jobs and their queue payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::types::{ArtifactId, JobId, JobKind, JobStatus};

/// Log line written when a job row is created
pub const QUEUED_MESSAGE: &str = "Job queued";

/// Work a job performs. Referenced entities are carried by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Reconcile the listing of a registered repository
    Sync { remote_id: String },
    /// Fetch one artifact into the content store
    Download { artifact_id: ArtifactId },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Sync { .. } => JobKind::Sync,
            JobPayload::Download { .. } => JobKind::Download,
        }
    }

    /// Message logged when a worker starts running this payload
    pub fn start_message(&self) -> String {
        match self {
            JobPayload::Sync { remote_id } => format!("Starting metadata sync for {}", remote_id),
            JobPayload::Download { artifact_id } => {
                format!("Starting download for artifact {}", artifact_id)
            }
        }
    }
}

/// A unit of asynchronous work with an append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub payload: JobPayload,
    /// One line per transition, newest last
    pub log: String,
    /// Number of times a worker has claimed the job
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a Pending job for the given payload
    pub fn new(payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: payload.kind(),
            status: JobStatus::Pending,
            payload,
            log: QUEUED_MESSAGE.to_string(),
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Latest log line
    pub fn last_message(&self) -> &str {
        self.log.lines().last().unwrap_or("")
    }

    /// Apply a status transition in memory, appending `message` to the log
    pub fn transition(&mut self, to: JobStatus, message: &str) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(HubError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == JobStatus::Running {
            self.attempts += 1;
        }
        self.status = to;
        self.log = append_log_line(&self.log, message);
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Collapse a message onto a single log line
pub fn sanitize_log_message(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}

/// Append one line to a job log
pub fn append_log_line(log: &str, message: &str) -> String {
    let line = sanitize_log_message(message);
    if log.is_empty() {
        line
    } else {
        format!("{}\n{}", log, line)
    }
}

/// Message carried by the job queue transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub payload: JobPayload,
}

impl From<&Job> for JobMessage {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            payload: job.payload.clone(),
        }
    }
}
