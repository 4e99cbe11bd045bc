//! Artifact acquisition
//!
//! Fetches one artifact into a per-artifact staging directory, hashes it and
//! commits it into the content store. The staging directory is stable so a
//! retried download resumes a partial transfer.

use chrono::Utc;
use model_hub_core::{Artifact, ArtifactId, DownloadStatus, Repository};
use model_hub_db::CatalogRepository;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::dto::DownloadSummary;
use crate::error::{ServiceError, ServiceResult};
use crate::integrity::{check_recorded_hash, hash_file, RecordedHash};
use crate::registry::ModelRegistryClient;
use crate::settings::HubSettings;
use crate::store::ContentStore;

/// Marks an artifact Failed when its download future is dropped while the
/// artifact is Downloading, as happens when an outer job deadline fires.
struct AbandonGuard {
    catalog: Arc<dyn CatalogRepository>,
    artifact_id: ArtifactId,
    armed: bool,
}

impl AbandonGuard {
    fn new(catalog: Arc<dyn CatalogRepository>, artifact_id: ArtifactId) -> Self {
        Self {
            catalog,
            artifact_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let artifact_id = self.artifact_id;
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(artifact_id = %artifact_id, "Download abandoned outside a runtime, status left as Downloading");
                return;
            }
        };
        let catalog = self.catalog.clone();
        warn!(artifact_id = %artifact_id, "Download abandoned, marking artifact as failed");
        handle.spawn(async move {
            if let Err(e) = catalog
                .set_download_status(&artifact_id, DownloadStatus::Failed)
                .await
            {
                warn!(artifact_id = %artifact_id, error = %e, "Failed to mark abandoned download as failed");
            }
        });
    }
}

/// Downloads artifacts into the content store
pub struct DownloadOrchestrator {
    catalog: Arc<dyn CatalogRepository>,
    registry: Arc<dyn ModelRegistryClient>,
    store: ContentStore,
    settings: HubSettings,
}

impl DownloadOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        registry: Arc<dyn ModelRegistryClient>,
        store: ContentStore,
        settings: HubSettings,
    ) -> Self {
        Self {
            catalog,
            registry,
            store,
            settings,
        }
    }

    /// Download one artifact. On failure the artifact is marked Failed and the
    /// original error is returned.
    #[instrument(skip(self), fields(artifact_id = %artifact_id))]
    pub async fn download_artifact(&self, artifact_id: &ArtifactId) -> ServiceResult<DownloadSummary> {
        let artifact = self
            .catalog
            .find_artifact(artifact_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("artifact {}", artifact_id)))?;
        let repository = self
            .catalog
            .find_repository(&artifact.repository_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("repository {}", artifact.repository_id))
            })?;

        match self.acquire(artifact, &repository).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if let Err(e) = self
                    .catalog
                    .set_download_status(artifact_id, DownloadStatus::Failed)
                    .await
                {
                    warn!(error = %e, "Failed to mark artifact as failed");
                }
                Err(err)
            }
        }
    }

    async fn acquire(
        &self,
        artifact: Artifact,
        repository: &Repository,
    ) -> ServiceResult<DownloadSummary> {
        self.catalog
            .set_download_status(&artifact.id, DownloadStatus::Downloading)
            .await?;

        let artifact_id = artifact.id;
        let guard = AbandonGuard::new(self.catalog.clone(), artifact_id);
        let work = self.fetch_and_commit(artifact, repository);
        let result = match self.settings.download_timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                Err(ServiceError::Timeout(format!(
                    "download of artifact {} exceeded {}s",
                    artifact_id,
                    limit.as_secs()
                )))
            }),
            None => work.await,
        };
        guard.disarm();
        result
    }

    async fn fetch_and_commit(
        &self,
        artifact: Artifact,
        repository: &Repository,
    ) -> ServiceResult<DownloadSummary> {
        let staging = self.store.temp_dir(&artifact.id);
        let fetched = self
            .registry
            .fetch_file(
                &repository.remote_id,
                &artifact.file_path,
                &self.settings.revision,
                &staging,
            )
            .await?;

        let digest = hash_file(&fetched, self.store.algorithm()).await?;

        // A declared LFS sha256 must match the fetched bytes whatever the store
        // algorithm. Git blob ids are not checked.
        let recorded =
            check_recorded_hash(&fetched, artifact.content_hash.as_deref(), &digest).await?;
        if let RecordedHash::Mismatched { expected } = recorded {
            self.store.cleanup_temp(&artifact.id).await;
            return Err(ServiceError::DownloadFailed {
                path: artifact.file_path.clone(),
                cause: format!(
                    "checksum mismatch: expected {}, got {}",
                    expected,
                    digest.hex()
                ),
            });
        }

        let outcome = self.store.commit(&fetched, &digest).await?;
        self.store.cleanup_temp(&artifact.id).await;

        let local_path = outcome.path.to_string_lossy().into_owned();
        self.catalog
            .complete_download(&artifact.id, &local_path, digest.hex(), Utc::now())
            .await?;

        info!(
            path = %artifact.file_path,
            digest = %digest,
            deduplicated = outcome.deduplicated,
            "Artifact downloaded"
        );

        Ok(DownloadSummary {
            artifact_id: artifact.id,
            local_path,
            digest,
            deduplicated: outcome.deduplicated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, seed_artifact, seed_repository, sha256_hex, FakeRegistry};
    use model_hub_core::{HashAlgorithm, RemoteFile, RepositoryId};
    use model_hub_db::{ArtifactChange, SyncChangeset};
    use std::path::Path;
    use std::time::Duration;

    const REPO: &str = "acme/tiny";

    fn orchestrator(
        catalog: Arc<dyn CatalogRepository>,
        registry: Arc<FakeRegistry>,
        settings: HubSettings,
    ) -> DownloadOrchestrator {
        let store = ContentStore::new(&settings.store_root, settings.hash_algorithm);
        DownloadOrchestrator::new(catalog, registry, store, settings)
    }

    async fn wait_for_status(
        catalog: &Arc<dyn CatalogRepository>,
        id: &ArtifactId,
        status: DownloadStatus,
    ) -> Artifact {
        for _ in 0..100 {
            let artifact = catalog.find_artifact(id).await.unwrap().unwrap();
            if artifact.download_status == status {
                return artifact;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("artifact {} never reached {}", id, status);
    }

    async fn pending(
        catalog: &Arc<dyn CatalogRepository>,
        repository_id: RepositoryId,
        path: &str,
        bytes: &[u8],
    ) -> Artifact {
        let artifact = Artifact::new_from_remote(
            repository_id,
            &RemoteFile {
                path: path.to_string(),
                size: bytes.len() as u64,
                content_digest: Some(sha256_hex(bytes)),
                is_lfs: true,
            },
        );
        seed_artifact(catalog, artifact).await
    }

    fn blob_count(root: &Path) -> usize {
        std::fs::read_dir(root.join("blobs/sha256"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_download_commits_blob() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.safetensors", b"weights"));
        let artifact = pending(&catalog, repository.id, "model.safetensors", b"weights").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let summary = download.download_artifact(&artifact.id).await.unwrap();
        assert!(!summary.deduplicated);
        assert_eq!(summary.digest.hex(), sha256_hex(b"weights"));
        let expected = dir.path().join("blobs/sha256").join(sha256_hex(b"weights"));
        assert_eq!(summary.local_path, expected.to_string_lossy());
        assert_eq!(std::fs::read(&expected).unwrap(), b"weights");
        assert!(!dir.path().join("temp").join(artifact.id.to_string()).exists());

        let stored = catalog.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Completed);
        assert_eq!(stored.content_hash.as_deref(), Some(summary.digest.hex()));
        assert_eq!(stored.local_path.as_deref(), Some(summary.local_path.as_str()));
        assert!(stored.last_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_identical_content_is_stored_once() {
        let (catalog, dir) = catalog().await;
        let first_repo = seed_repository(&catalog, "acme/one").await;
        let second_repo = seed_repository(&catalog, "acme/two").await;
        let registry = Arc::new(
            FakeRegistry::new()
                .with_file("acme/one", "model.bin", b"shared")
                .with_file("acme/two", "weights/model.bin", b"shared"),
        );
        let first = pending(&catalog, first_repo.id, "model.bin", b"shared").await;
        let second = pending(&catalog, second_repo.id, "weights/model.bin", b"shared").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let a = download.download_artifact(&first.id).await.unwrap();
        let b = download.download_artifact(&second.id).await.unwrap();
        assert!(!a.deduplicated);
        assert!(b.deduplicated);
        assert_eq!(a.local_path, b.local_path);
        assert_eq!(blob_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_redownload_keeps_bytes() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.onnx", b"graph"));
        let artifact = pending(&catalog, repository.id, "model.onnx", b"graph").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let first = download.download_artifact(&artifact.id).await.unwrap();
        let second = download.download_artifact(&artifact.id).await.unwrap();
        assert_eq!(first.local_path, second.local_path);
        assert_eq!(std::fs::read(&second.local_path).unwrap(), b"graph");
        let stored = catalog.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_fetch_failure_marks_failed() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.bin", b"x"));
        registry.fail_path("model.bin");
        let artifact = pending(&catalog, repository.id, "model.bin", b"x").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let err = download.download_artifact(&artifact.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::DownloadFailed { .. }));
        let stored = catalog.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Failed);
        assert_eq!(blob_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.bin", b"tampered"));
        let artifact = pending(&catalog, repository.id, "model.bin", b"original").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let err = download.download_artifact(&artifact.id).await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert_eq!(blob_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_download_timeout() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.bin", b"slow"));
        registry.set_fetch_delay(Duration::from_secs(5));
        let artifact = pending(&catalog, repository.id, "model.bin", b"slow").await;
        let settings =
            HubSettings::new(dir.path()).download_timeout(Some(Duration::from_millis(50)));
        let download = orchestrator(catalog.clone(), registry, settings);

        let err = download.download_artifact(&artifact.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
        let stored = catalog.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn test_declared_sha256_checked_under_other_algorithms() {
        for algorithm in [HashAlgorithm::BLAKE3, HashAlgorithm::SHA3_256] {
            let (catalog, dir) = catalog().await;
            let repository = seed_repository(&catalog, REPO).await;
            let registry = Arc::new(
                FakeRegistry::new()
                    .with_file(REPO, "model.bin", b"weights")
                    .with_file(REPO, "other.bin", b"tampered"),
            );
            let good = pending(&catalog, repository.id, "model.bin", b"weights").await;
            let bad = pending(&catalog, repository.id, "other.bin", b"original").await;
            let settings = HubSettings::new(dir.path()).hash_algorithm(algorithm);
            let download = orchestrator(catalog.clone(), registry, settings);

            let summary = download.download_artifact(&good.id).await.unwrap();
            assert_eq!(summary.digest.algorithm, algorithm);
            let blob = dir
                .path()
                .join("blobs")
                .join(algorithm.dir_name())
                .join(summary.digest.hex());
            assert_eq!(summary.local_path, blob.to_string_lossy());
            assert_eq!(std::fs::read(&blob).unwrap(), b"weights");
            let stored = catalog.find_artifact(&good.id).await.unwrap().unwrap();
            assert_eq!(stored.download_status, DownloadStatus::Completed);
            assert_eq!(stored.content_hash.as_deref(), Some(summary.digest.hex()));

            let err = download.download_artifact(&bad.id).await.unwrap_err();
            assert!(err.to_string().contains("checksum mismatch"), "{:?}: {}", algorithm, err);
            assert!(err.to_string().contains(&sha256_hex(b"original")));
            let stored = catalog.find_artifact(&bad.id).await.unwrap().unwrap();
            assert_eq!(stored.download_status, DownloadStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_completion_keeps_concurrent_sync_fields() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.bin", b"weights"));
        registry.set_fetch_delay(Duration::from_millis(300));
        let artifact = pending(&catalog, repository.id, "model.bin", b"weights").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        let sync = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let mut changeset = SyncChangeset::new(repository.id);
            changeset.push(ArtifactChange::Refreshed {
                id: artifact.id,
                size_bytes: 4096,
                content_hash: Some(sha256_hex(b"weights")),
                fetched: None,
            });
            catalog.apply_sync(changeset).await.unwrap();
        };
        let (result, ()) = tokio::join!(download.download_artifact(&artifact.id), sync);
        result.unwrap();

        let stored = catalog.find_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(stored.download_status, DownloadStatus::Completed);
        assert_eq!(stored.size_bytes, 4096);
    }

    #[tokio::test]
    async fn test_abandoned_download_marks_failed() {
        let (catalog, dir) = catalog().await;
        let repository = seed_repository(&catalog, REPO).await;
        let registry = Arc::new(FakeRegistry::new().with_file(REPO, "model.bin", b"slow"));
        registry.set_fetch_delay(Duration::from_secs(5));
        let artifact = pending(&catalog, repository.id, "model.bin", b"slow").await;
        let download = orchestrator(catalog.clone(), registry, HubSettings::new(dir.path()));

        // An outer deadline drops the download future mid-fetch
        let outer =
            tokio::time::timeout(Duration::from_millis(50), download.download_artifact(&artifact.id))
                .await;
        assert!(outer.is_err());

        wait_for_status(&catalog, &artifact.id, DownloadStatus::Failed).await;
    }

    #[tokio::test]
    async fn test_unknown_artifact() {
        let (catalog, dir) = catalog().await;
        let download = orchestrator(catalog, Arc::new(FakeRegistry::new()), HubSettings::new(dir.path()));
        assert!(matches!(
            download.download_artifact(&ArtifactId::new()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
