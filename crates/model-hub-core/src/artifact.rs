//! Artifacts: individual files of a repository and their download state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, infer_format_and_precision, ModelFormat, Precision};
use crate::types::{ArtifactId, ArtifactType, DownloadStatus, RepositoryId};

/// One entry of a remote repository listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the repository root
    pub path: String,
    /// Declared size in bytes
    pub size: u64,
    /// LFS sha256 when the file is stored in LFS, otherwise the git blob id
    pub content_digest: Option<String>,
    pub is_lfs: bool,
}

/// A file of a registered repository as recorded in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub repository_id: RepositoryId,
    /// Path relative to the repository root, unique within the repository
    pub file_path: String,
    pub artifact_type: ArtifactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ModelFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<Precision>,
    pub size_bytes: u64,
    /// Remote digest after sync, local digest hex once downloaded
    pub content_hash: Option<String>,
    pub download_status: DownloadStatus,
    pub local_path: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Build a Pending artifact from its first observation in a remote listing
    pub fn new_from_remote(repository_id: RepositoryId, file: &RemoteFile) -> Self {
        let (format, precision) = infer_format_and_precision(&file.path);
        let now = Utc::now();
        Self {
            id: ArtifactId::new(),
            repository_id,
            file_path: file.path.clone(),
            artifact_type: classify(&file.path),
            format,
            precision,
            size_bytes: file.size,
            content_hash: file.content_digest.clone(),
            download_status: DownloadStatus::Pending,
            local_path: None,
            last_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a successful fetch
    pub fn mark_completed(&mut self, local_path: impl Into<String>, verified_at: DateTime<Utc>) {
        self.local_path = Some(local_path.into());
        self.download_status = DownloadStatus::Completed;
        self.last_verified_at = Some(verified_at);
        self.updated_at = verified_at;
    }

    pub fn is_completed(&self) -> bool {
        self.download_status == DownloadStatus::Completed
    }
}
