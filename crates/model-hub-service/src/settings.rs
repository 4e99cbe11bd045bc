//! Explicit settings passed to the orchestrators and job tracker

use model_hub_core::HashAlgorithm;
use std::path::PathBuf;
use std::time::Duration;

/// Default git revision synced and downloaded
pub const DEFAULT_REVISION: &str = "main";

/// Config and tokenizer files smaller than this are fetched during sync
pub const DEFAULT_METADATA_SIZE_THRESHOLD: u64 = 10_000_000;

/// Default deadline for a whole job
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Default deadline for fetch, hash and commit of one artifact
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// Settings shared by the sync and download pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Root of the content store (blobs/, metadata/, temp/)
    pub store_root: PathBuf,
    /// Git revision to list and fetch
    pub revision: String,
    /// Strict upper bound on the size of inline-fetched metadata files
    pub metadata_size_threshold: u64,
    /// Algorithm used to address blobs
    pub hash_algorithm: HashAlgorithm,
    /// Deadline for a job; also the lease after which a Running job is reclaimable
    pub job_timeout: Option<Duration>,
    /// Deadline for fetching, hashing and committing one artifact
    pub download_timeout: Option<Duration>,
}

impl HubSettings {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            revision: DEFAULT_REVISION.to_string(),
            metadata_size_threshold: DEFAULT_METADATA_SIZE_THRESHOLD,
            hash_algorithm: HashAlgorithm::default(),
            job_timeout: Some(Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS)),
            download_timeout: Some(Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS)),
        }
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn metadata_size_threshold(mut self, threshold: u64) -> Self {
        self.metadata_size_threshold = threshold;
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout = timeout;
        self
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::new("data/store")
    }
}
