//! Registered model repositories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::types::{RepositoryId, RepositoryStatus};

/// Only remote source currently supported
pub const SOURCE_HUGGINGFACE: &str = "huggingface";

/// A model repository mirrored from the remote registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    /// Organization or user owning the repository (e.g. "Wan-AI")
    pub vendor: String,
    /// Repository name within the vendor namespace
    pub name: String,
    pub source: String,
    /// Remote identifier ("vendor/name"), unique across the catalog
    pub remote_id: String,
    pub status: RepositoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Create a newly registered repository
    pub fn new(
        vendor: impl Into<String>,
        name: impl Into<String>,
        remote_id: impl Into<String>,
    ) -> Result<Self> {
        let vendor = vendor.into();
        let name = name.into();
        let remote_id = remote_id.into();

        validate_remote_id(&remote_id)?;
        if vendor.trim().is_empty() || name.trim().is_empty() {
            return Err(HubError::ValidationError(
                "vendor and name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: RepositoryId::new(),
            vendor,
            name,
            source: SOURCE_HUGGINGFACE.to_string(),
            remote_id,
            status: RepositoryStatus::Registered,
            created_at: now,
            updated_at: now,
        })
    }

    /// Human-readable label used in logs
    pub fn label(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }

    /// Remote id made safe for use as a single directory name
    pub fn sanitized_remote_id(&self) -> String {
        sanitize_remote_id(&self.remote_id)
    }
}

/// Replace path separators in a remote id so it fits in one path component
pub fn sanitize_remote_id(remote_id: &str) -> String {
    remote_id.replace('/', "_")
}

/// Validate a remote repository identifier
pub fn validate_remote_id(remote_id: &str) -> Result<()> {
    if remote_id.trim().is_empty() {
        return Err(HubError::ValidationError(
            "remote id must not be empty".to_string(),
        ));
    }
    if remote_id.starts_with('/')
        || remote_id.ends_with('/')
        || remote_id.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(HubError::ValidationError(format!(
            "malformed remote id: {}",
            remote_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_repository() {
        let repo = Repository::new("Wan-AI", "Wan2.1-T2V-1.3B", "Wan-AI/Wan2.1-T2V-1.3B").unwrap();
        assert_eq!(repo.status, RepositoryStatus::Registered);
        assert_eq!(repo.source, "huggingface");
        assert_eq!(repo.label(), "Wan-AI/Wan2.1-T2V-1.3B");
        assert_eq!(repo.sanitized_remote_id(), "Wan-AI_Wan2.1-T2V-1.3B");
    }

    #[test]
    fn test_rejects_malformed_remote_ids() {
        assert!(Repository::new("a", "b", "").is_err());
        assert!(Repository::new("a", "b", "/abs").is_err());
        assert!(Repository::new("a", "b", "a//b").is_err());
        assert!(Repository::new("a", "b", "a/../b").is_err());
        assert!(Repository::new("", "b", "a/b").is_err());
        assert!(Repository::new("a", "b", "gpt2").is_ok());
    }
}
