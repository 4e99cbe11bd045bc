//! Shared fixtures for the service unit tests

use async_trait::async_trait;
use model_hub_core::{Artifact, RemoteFile, Repository};
use model_hub_db::{
    create_pool, ArtifactChange, CatalogRepository, PoolConfig, SqliteCatalog, SyncChangeset,
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::registry::{validate_remote_path, ModelRegistryClient, RegistryError};

/// Catalog backed by a SQLite file in a fresh temp directory
pub async fn catalog() -> (Arc<dyn CatalogRepository>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let pool = create_pool(&PoolConfig::new(url)).await.unwrap();
    (Arc::new(SqliteCatalog::new(pool)), dir)
}

pub async fn seed_repository(catalog: &Arc<dyn CatalogRepository>, remote_id: &str) -> Repository {
    let (vendor, name) = remote_id.split_once('/').unwrap();
    let repository = Repository::new(vendor, name, remote_id).unwrap();
    catalog.create_repository(repository).await.unwrap()
}

pub async fn seed_artifact(catalog: &Arc<dyn CatalogRepository>, artifact: Artifact) -> Artifact {
    let mut changeset = SyncChangeset::new(artifact.repository_id);
    changeset.push(ArtifactChange::Created(artifact.clone()));
    catalog.apply_sync(changeset).await.unwrap();
    catalog
        .find_artifact_by_path(&artifact.repository_id, &artifact.file_path)
        .await
        .unwrap()
        .unwrap()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// In-memory registry serving a fixed set of files per repository
#[derive(Default)]
pub struct FakeRegistry {
    files: Mutex<HashMap<String, Vec<(RemoteFile, Vec<u8>)>>>,
    failing: Mutex<HashSet<String>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` at `path`, listing the real byte count
    pub fn with_file(self, repo_id: &str, path: &str, bytes: &[u8]) -> Self {
        self.put_file(repo_id, path, bytes.len() as u64, bytes);
        self
    }

    /// Serve `bytes` at `path` but list `declared_size`
    pub fn with_declared_file(
        self,
        repo_id: &str,
        path: &str,
        declared_size: u64,
        bytes: &[u8],
    ) -> Self {
        self.put_file(repo_id, path, declared_size, bytes);
        self
    }

    /// Register a repository with no files
    pub fn with_repository(self, repo_id: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .entry(repo_id.to_string())
            .or_default();
        self
    }

    pub fn put_file(&self, repo_id: &str, path: &str, declared_size: u64, bytes: &[u8]) {
        let file = RemoteFile {
            path: path.to_string(),
            size: declared_size,
            content_digest: Some(sha256_hex(bytes)),
            is_lfs: true,
        };
        let mut files = self.files.lock().unwrap();
        let entries = files.entry(repo_id.to_string()).or_default();
        entries.retain(|(existing, _)| existing.path != path);
        entries.push((file, bytes.to_vec()));
    }

    pub fn fail_path(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn clear_failure(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRegistryClient for FakeRegistry {
    async fn list_files(
        &self,
        repo_id: &str,
        _revision: &str,
    ) -> Result<Vec<RemoteFile>, RegistryError> {
        let files = self.files.lock().unwrap();
        files
            .get(repo_id)
            .map(|entries| entries.iter().map(|(file, _)| file.clone()).collect())
            .ok_or_else(|| RegistryError::RepositoryNotFound(repo_id.to_string()))
    }

    async fn fetch_file(
        &self,
        repo_id: &str,
        path: &str,
        _revision: &str,
        destination_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = |cause: &str| RegistryError::DownloadFailed {
            path: path.to_string(),
            cause: cause.to_string(),
        };
        if self.failing.lock().unwrap().contains(path) {
            return Err(failed("simulated failure"));
        }

        let bytes = {
            let files = self.files.lock().unwrap();
            files
                .get(repo_id)
                .and_then(|entries| entries.iter().find(|(file, _)| file.path == path))
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| failed("HTTP 404"))?
        };

        let target = destination_dir.join(validate_remote_path(path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(&e.to_string()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| failed(&e.to_string()))?;
        Ok(target)
    }
}
