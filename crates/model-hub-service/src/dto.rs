//! Data Transfer Objects (DTOs) for service layer
//!
//! This module defines request and response types used at service boundaries,
//! and the summaries the orchestrators hand back to the job tracker.

use model_hub_core::{ArtifactId, ContentDigest, Job, Repository};
use serde::{Deserialize, Serialize};

/// Result of a job operation that can be written to the job log
pub trait JobOutcome {
    /// One-line summary recorded when the job completes
    fn summary(&self) -> String;
}

// ============================================================================
// Registration DTOs
// ============================================================================

/// Request to register a remote repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRepositoryRequest {
    /// Organization or user owning the repository
    pub vendor: String,

    /// Repository name
    pub name: String,

    /// Remote identifier, e.g. "Wan-AI/Wan2.1-T2V-1.3B"
    pub remote_id: String,

    /// Submit a sync job right after registering
    #[serde(default)]
    pub auto_sync: bool,
}

impl RegisterRepositoryRequest {
    /// Build a request whose vendor and name are split from the remote id
    pub fn from_remote_id(remote_id: impl Into<String>) -> Self {
        let remote_id = remote_id.into();
        let (vendor, name) = match remote_id.split_once('/') {
            Some((vendor, name)) => (vendor.to_string(), name.to_string()),
            None => (remote_id.clone(), remote_id.clone()),
        };
        Self {
            vendor,
            name,
            remote_id,
            auto_sync: false,
        }
    }

    pub fn auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }
}

/// Response from repository registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRepositoryResponse {
    pub repository: Repository,

    /// Sync job submitted when `auto_sync` was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_job: Option<Job>,
}

// ============================================================================
// Job summaries
// ============================================================================

/// What one sync observed and wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub files_seen: usize,
    pub artifacts_created: usize,
    pub metadata_downloaded: usize,
}

impl JobOutcome for SyncSummary {
    fn summary(&self) -> String {
        format!(
            "Synced {} files, created {} new artifacts, downloaded {} metadata files",
            self.files_seen, self.artifacts_created, self.metadata_downloaded
        )
    }
}

/// Where a downloaded artifact ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub artifact_id: ArtifactId,
    pub local_path: String,
    pub digest: ContentDigest,
    /// True when the content was already in the store
    pub deduplicated: bool,
}

impl JobOutcome for DownloadSummary {
    fn summary(&self) -> String {
        if self.deduplicated {
            format!("Downloaded artifact to {} (deduplicated)", self.local_path)
        } else {
            format!("Downloaded artifact to {}", self.local_path)
        }
    }
}

// ============================================================================
// Integrity DTOs
// ============================================================================

/// Result of re-verifying a completed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub artifact_id: ArtifactId,

    /// Whether the local file still matches the catalog
    pub verified: bool,

    /// Content hash recorded in the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// Digest computed from the local file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
