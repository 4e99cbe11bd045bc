//! Integrity verification service
//!
//! This module provides streaming checksum computation over local files and
//! re-verification of completed artifacts against the digest in the catalog.

use async_trait::async_trait;
use chrono::Utc;
use model_hub_core::{ArtifactId, ContentDigest, HashAlgorithm};
use model_hub_db::CatalogRepository;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::dto::VerificationResult;
use crate::error::{ServiceError, ServiceResult};

/// Read size for streaming hashes
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

enum StreamingHasher {
    Sha256(sha2::Sha256),
    Sha3_256(sha3::Sha3_256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::SHA256 => {
                use sha2::Digest;
                StreamingHasher::Sha256(sha2::Sha256::new())
            }
            HashAlgorithm::SHA3_256 => {
                use sha3::Digest;
                StreamingHasher::Sha3_256(sha3::Sha3_256::new())
            }
            HashAlgorithm::BLAKE3 => StreamingHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Sha256(hasher) => {
                use sha2::Digest;
                hasher.update(data);
            }
            StreamingHasher::Sha3_256(hasher) => {
                use sha3::Digest;
                hasher.update(data);
            }
            StreamingHasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHasher::Sha256(hasher) => {
                use sha2::Digest;
                hasher.finalize().to_vec()
            }
            StreamingHasher::Sha3_256(hasher) => {
                use sha3::Digest;
                hasher.finalize().to_vec()
            }
            StreamingHasher::Blake3(hasher) => hasher.finalize().as_bytes().to_vec(),
        }
    }
}

fn hash_file_blocking(path: &Path, algorithm: HashAlgorithm) -> ServiceResult<ContentDigest> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ServiceError::Internal(format!("open {}: {}", path.display(), e)))?;
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| ServiceError::Internal(format!("read {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(ContentDigest::from_bytes(algorithm, &hasher.finalize())?)
}

/// Hash a file in fixed-size chunks on the blocking pool
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> ServiceResult<ContentDigest> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path, algorithm))
        .await
        .map_err(|e| ServiceError::Internal(format!("hashing task failed: {}", e)))?
}

/// Outcome of comparing a file against the hash recorded for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordedHash {
    Matched,
    Mismatched { expected: String },
    /// The recorded value is not a 64-digit digest, e.g. a git blob id
    Unchecked,
}

/// Compare a file against a recorded hash. The recorded value is either a
/// digest of the store algorithm or a registry LFS sha256; the second case
/// costs an extra sha256 pass when the store uses another algorithm.
pub(crate) async fn check_recorded_hash(
    path: &Path,
    recorded: Option<&str>,
    computed: &ContentDigest,
) -> ServiceResult<RecordedHash> {
    let recorded = match recorded.and_then(|hash| ContentDigest::new(computed.algorithm, hash).ok()) {
        Some(recorded) => recorded,
        None => return Ok(RecordedHash::Unchecked),
    };
    if recorded.matches(computed.hex()) {
        return Ok(RecordedHash::Matched);
    }
    if computed.algorithm != HashAlgorithm::SHA256 {
        let sha256 = hash_file(path, HashAlgorithm::SHA256).await?;
        if recorded.matches(sha256.hex()) {
            return Ok(RecordedHash::Matched);
        }
    }
    Ok(RecordedHash::Mismatched {
        expected: recorded.hex().to_string(),
    })
}

/// Trait for integrity verification operations
#[async_trait]
pub trait IntegrityService: Send + Sync {
    /// Re-hash a completed artifact's local file and compare it with the catalog
    async fn verify_artifact(&self, artifact_id: &ArtifactId) -> ServiceResult<VerificationResult>;
}

/// Default implementation of IntegrityService
pub struct DefaultIntegrityService {
    catalog: Arc<dyn CatalogRepository>,
    algorithm: HashAlgorithm,
}

impl DefaultIntegrityService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, algorithm: HashAlgorithm) -> Self {
        Self { catalog, algorithm }
    }
}

#[async_trait]
impl IntegrityService for DefaultIntegrityService {
    #[instrument(skip(self), fields(artifact_id = %artifact_id))]
    async fn verify_artifact(&self, artifact_id: &ArtifactId) -> ServiceResult<VerificationResult> {
        let artifact = self
            .catalog
            .find_artifact(artifact_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("artifact {}", artifact_id)))?;

        let local_path = match (&artifact.local_path, artifact.is_completed()) {
            (Some(path), true) => PathBuf::from(path),
            _ => {
                return Err(ServiceError::InvalidInput(format!(
                    "artifact {} has not been downloaded",
                    artifact_id
                )))
            }
        };

        let size_on_disk = match tokio::fs::metadata(&local_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "Local file missing");
                return Ok(VerificationResult {
                    artifact_id: *artifact_id,
                    verified: false,
                    expected: artifact.content_hash.clone(),
                    actual: None,
                    error: Some(format!("local file {} missing", local_path.display())),
                });
            }
        };

        let computed = hash_file(&local_path, self.algorithm).await?;

        // Metadata fetched during sync keeps the registry's git blob id, which is
        // not a digest at all; those files are checked by size.
        let recorded =
            check_recorded_hash(&local_path, artifact.content_hash.as_deref(), &computed).await?;
        let (verified, error) = match recorded {
            RecordedHash::Matched => (true, None),
            RecordedHash::Mismatched { expected } => (
                false,
                Some(format!(
                    "Checksum mismatch: expected {}, got {}",
                    expected,
                    computed.hex()
                )),
            ),
            RecordedHash::Unchecked if size_on_disk == artifact.size_bytes => (true, None),
            RecordedHash::Unchecked => (
                false,
                Some(format!(
                    "Size mismatch: expected {} bytes, found {}",
                    artifact.size_bytes, size_on_disk
                )),
            ),
        };

        if verified {
            self.catalog
                .record_verification(artifact_id, Utc::now())
                .await?;
            debug!("Artifact verified");
        } else {
            warn!(error = ?error, "Artifact failed verification");
        }

        Ok(VerificationResult {
            artifact_id: *artifact_id,
            verified,
            expected: artifact.content_hash.clone(),
            actual: Some(computed.hex().to_string()),
            error,
        })
    }
}
