//! Content-addressed blob store on the local filesystem
//!
//! Layout under the store root:
//!
//! ```text
//! blobs/<algorithm>/<digest-hex>   committed artifacts, one file per distinct content
//! metadata/<vendor>_<name>/<path>  small config and tokenizer files fetched during sync
//! temp/<artifact-id>/              staging area for in-flight downloads
//! ```

use model_hub_core::repository::sanitize_remote_id;
use model_hub_core::{ArtifactId, ContentDigest, HashAlgorithm};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const BLOBS_DIR: &str = "blobs";
const METADATA_DIR: &str = "metadata";
const TEMP_DIR: &str = "temp";

/// Content store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsafe store path: {0}")]
    UnsafePath(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a committed blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub path: PathBuf,
    /// True when a blob with the same digest already existed
    pub deduplicated: bool,
}

/// Filesystem content store
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    algorithm: HashAlgorithm,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
        }
    }

    /// Create the top-level directories
    pub async fn init(&self) -> Result<(), StoreError> {
        for dir in [self.blobs_dir(), self.root.join(METADATA_DIR), self.root.join(TEMP_DIR)] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Algorithm used to address blobs
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOBS_DIR).join(self.algorithm.dir_name())
    }

    /// Path of the blob for a digest, whether or not it exists
    pub fn path(&self, digest: &ContentDigest) -> PathBuf {
        self.root
            .join(BLOBS_DIR)
            .join(digest.algorithm.dir_name())
            .join(digest.hex())
    }

    /// Staging directory for one artifact's download
    pub fn temp_dir(&self, artifact_id: &ArtifactId) -> PathBuf {
        self.root.join(TEMP_DIR).join(artifact_id.to_string())
    }

    /// Directory holding inline-fetched metadata for a repository
    pub fn metadata_dir(&self, remote_id: &str) -> Result<PathBuf, StoreError> {
        let name = sanitize_remote_id(remote_id);
        if name.is_empty() || name == "." || name.contains("..") || name.contains('\\') {
            return Err(StoreError::UnsafePath(remote_id.to_string()));
        }
        Ok(self.root.join(METADATA_DIR).join(name))
    }

    pub async fn exists(&self, digest: &ContentDigest) -> bool {
        tokio::fs::metadata(self.path(digest))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Move a fetched file into the store under its digest.
    ///
    /// When a blob with the same digest is already present, the source is
    /// discarded and the existing blob is reused.
    #[instrument(skip(self, source), fields(digest = %digest))]
    pub async fn commit(
        &self,
        source: &Path,
        digest: &ContentDigest,
    ) -> Result<CommitOutcome, StoreError> {
        let target = self.path(digest);

        if self.exists(digest).await {
            discard(source).await;
            debug!("Blob already present");
            return Ok(CommitOutcome {
                path: target,
                deduplicated: true,
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        // A hard link either creates the blob or fails because a concurrent
        // commit won; both leave exactly one complete file at the target.
        match tokio::fs::hard_link(source, &target).await {
            Ok(()) => {
                discard(source).await;
                Ok(CommitOutcome {
                    path: target,
                    deduplicated: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                discard(source).await;
                debug!("Blob committed concurrently");
                Ok(CommitOutcome {
                    path: target,
                    deduplicated: true,
                })
            }
            Err(e) => {
                debug!(error = %e, "Hard link unavailable, renaming");
                if self.exists(digest).await {
                    discard(source).await;
                    return Ok(CommitOutcome {
                        path: target,
                        deduplicated: true,
                    });
                }
                tokio::fs::rename(source, &target)
                    .await
                    .map_err(|e| StoreError::io(&target, e))?;
                Ok(CommitOutcome {
                    path: target,
                    deduplicated: false,
                })
            }
        }
    }

    /// Remove an artifact's staging directory
    pub async fn cleanup_temp(&self, artifact_id: &ArtifactId) {
        let dir = self.temp_dir(artifact_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to clean up temp directory"),
        }
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(fill: char) -> ContentDigest {
        ContentDigest::new(HashAlgorithm::SHA256, fill.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn test_layout() {
        let store = ContentStore::new("/srv/store", HashAlgorithm::SHA256);
        let d = digest('a');
        assert_eq!(
            store.path(&d),
            PathBuf::from(format!("/srv/store/blobs/sha256/{}", "a".repeat(64)))
        );
        assert_eq!(
            store.metadata_dir("Wan-AI/Wan2.1").unwrap(),
            PathBuf::from("/srv/store/metadata/Wan-AI_Wan2.1")
        );
        assert!(store.metadata_dir("../etc").is_err());

        let id = ArtifactId::new();
        assert_eq!(
            store.temp_dir(&id),
            PathBuf::from(format!("/srv/store/temp/{}", id))
        );
    }

    #[tokio::test]
    async fn test_commit_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path(), HashAlgorithm::SHA256);
        store.init().await.unwrap();

        let source = dir.path().join("staged.bin");
        std::fs::write(&source, b"payload").unwrap();

        let d = digest('b');
        let outcome = store.commit(&source, &d).await.unwrap();
        assert!(!outcome.deduplicated);
        assert_eq!(outcome.path, store.path(&d));
        assert_eq!(std::fs::read(&outcome.path).unwrap(), b"payload");
        assert!(!source.exists());
        assert!(store.exists(&d).await);
    }

    #[tokio::test]
    async fn test_commit_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path(), HashAlgorithm::SHA256);
        let d = digest('c');

        let first = dir.path().join("first.bin");
        std::fs::write(&first, b"same").unwrap();
        store.commit(&first, &d).await.unwrap();

        let second = dir.path().join("second.bin");
        std::fs::write(&second, b"same").unwrap();
        let outcome = store.commit(&second, &d).await.unwrap();

        assert!(outcome.deduplicated);
        assert!(!second.exists());
        let entries = std::fs::read_dir(store.blobs_dir()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_of_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path(), HashAlgorithm::SHA256);
        store.init().await.unwrap();
        let d = digest('d');

        for round in 0..8 {
            let sources: Vec<PathBuf> = (0..4)
                .map(|i| {
                    let path = dir.path().join(format!("staged-{}-{}.bin", round, i));
                    std::fs::write(&path, b"identical").unwrap();
                    path
                })
                .collect();

            let (a, b, c, e) = tokio::join!(
                store.commit(&sources[0], &d),
                store.commit(&sources[1], &d),
                store.commit(&sources[2], &d),
                store.commit(&sources[3], &d),
            );
            let outcomes = [a.unwrap(), b.unwrap(), c.unwrap(), e.unwrap()];

            let created = outcomes.iter().filter(|o| !o.deduplicated).count();
            assert!(created <= 1, "round {}: {} commits created the blob", round, created);
            if round > 0 {
                assert_eq!(created, 0);
            }
            for outcome in &outcomes {
                assert_eq!(outcome.path, store.path(&d));
            }
            for source in &sources {
                assert!(!source.exists());
            }
            assert_eq!(std::fs::read(store.path(&d)).unwrap(), b"identical");
            assert_eq!(std::fs::read_dir(store.blobs_dir()).unwrap().count(), 1);
        }
    }

    #[tokio::test]
    async fn test_cleanup_temp_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path(), HashAlgorithm::SHA256);
        let id = ArtifactId::new();

        let temp = store.temp_dir(&id);
        std::fs::create_dir_all(temp.join("nested")).unwrap();
        std::fs::write(temp.join("nested/file.bin"), b"x").unwrap();

        store.cleanup_temp(&id).await;
        assert!(!temp.exists());
        store.cleanup_temp(&id).await;
    }
}
