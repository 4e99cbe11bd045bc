//! Common test utilities and helpers
//!
//! Builds a complete hub against a temporary SQLite catalog and content
//! store, with a mock Hugging Face endpoint standing in for the registry.

#![allow(dead_code)]

use model_hub_core::{Job, JobMessage};
use model_hub_db::{create_pool, CatalogRepository, PoolConfig, SqliteCatalog};
use model_hub_service::{
    ChannelJobQueue, HubSettings, HuggingFaceClient, RegistryClientConfig, ServiceRegistry,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A hub wired to a mock registry
pub struct TestHub {
    pub server: MockServer,
    pub catalog: Arc<dyn CatalogRepository>,
    pub queue: Arc<ChannelJobQueue>,
    pub services: ServiceRegistry,
    dir: TempDir,
}

impl TestHub {
    pub async fn new() -> Self {
        Self::with_settings(|settings| settings).await
    }

    /// Build a hub, letting the caller adjust the default settings
    pub async fn with_settings(adjust: impl FnOnce(HubSettings) -> HubSettings) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let pool = create_pool(&PoolConfig::new(url))
            .await
            .expect("Failed to create catalog pool");
        let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalog::new(pool));

        let server = MockServer::start().await;
        let registry = Arc::new(
            HuggingFaceClient::new(RegistryClientConfig::new(server.uri()))
                .expect("Failed to build registry client"),
        );

        let queue = Arc::new(ChannelJobQueue::new());
        let settings = adjust(HubSettings::new(dir.path().join("store")));
        let services = ServiceRegistry::new(catalog.clone(), registry, queue.clone(), settings);
        services
            .store()
            .init()
            .await
            .expect("Failed to initialize content store");

        Self {
            server,
            catalog,
            queue,
            services,
            dir,
        }
    }

    pub fn store_root(&self) -> &Path {
        self.services.store().root()
    }

    /// Run a submitted job to completion and reload it
    pub async fn run_job(&self, job: &Job) -> Job {
        // Failures are recorded on the job row
        let _ = self
            .services
            .dispatcher()
            .dispatch(&JobMessage::from(job))
            .await;
        self.services
            .hub()
            .get_job(&job.id)
            .await
            .expect("Job disappeared")
    }

    /// Serve a tree listing for `remote_id` at revision main
    pub async fn serve_listing(&self, remote_id: &str, entries: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/api/models/{}/tree/main", remote_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(entries)))
            .mount(&self.server)
            .await;
    }

    /// Serve the bytes of one file at revision main
    pub async fn serve_file(&self, remote_id: &str, file_path: &str, bytes: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/resolve/main/{}", remote_id, file_path)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Answer 404 for the listing of `remote_id`
    pub async fn serve_missing(&self, remote_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/models/{}/tree/main", remote_id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted mock
    pub async fn reset_remote(&self) {
        self.server.reset().await;
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Listing entry for a small file kept in git
pub fn git_entry(file_path: &str, bytes: &[u8]) -> Value {
    json!({
        "type": "file",
        "path": file_path,
        "size": bytes.len(),
        "oid": format!("blob-{}", &sha256_hex(bytes)[..12]),
    })
}

/// Listing entry for an LFS file whose pointer declares `bytes`
pub fn lfs_entry(file_path: &str, bytes: &[u8]) -> Value {
    lfs_entry_sized(file_path, bytes.len() as u64, bytes)
}

/// Listing entry for an LFS file declaring `size` with the digest of `bytes`
pub fn lfs_entry_sized(file_path: &str, size: u64, bytes: &[u8]) -> Value {
    json!({
        "type": "file",
        "path": file_path,
        "size": 134,
        "oid": "pointer-blob",
        "lfs": {"oid": sha256_hex(bytes), "size": size, "pointerSize": 134},
    })
}

/// Listing entry for a directory, which the client skips
pub fn directory_entry(dir_path: &str) -> Value {
    json!({"type": "directory", "path": dir_path, "size": 0, "oid": "tree"})
}
