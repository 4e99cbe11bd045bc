//! Sync Integration Tests
//!
//! Registration followed by sync jobs against a mock Hugging Face listing.

mod common;

use common::{directory_entry, git_entry, lfs_entry_sized, TestHub};
use model_hub_core::{ArtifactType, DownloadStatus, JobStatus, RepositoryStatus};
use model_hub_service::RegisterRepositoryRequest;

const REPO: &str = "acme/tiny";

fn config_bytes() -> Vec<u8> {
    let mut bytes = b"{\"hidden_size\": 8}".to_vec();
    bytes.resize(500, b' ');
    bytes
}

async fn register(hub: &TestHub) -> model_hub_core::Job {
    hub.services
        .hub()
        .register_repository(RegisterRepositoryRequest::from_remote_id(REPO).auto_sync(true))
        .await
        .expect("Failed to register repository")
        .sync_job
        .expect("Sync job was not submitted")
}

async fn serve_tiny(hub: &TestHub, config: &[u8]) {
    hub.serve_listing(
        REPO,
        vec![
            git_entry("config.json", config),
            lfs_entry_sized("model.safetensors", 2_000_000_000, b"weights"),
        ],
    )
    .await;
    hub.serve_file(REPO, "config.json", config).await;
}

#[tokio::test]
async fn test_sync_catalogs_files_and_fetches_metadata() {
    let hub = TestHub::new().await;
    serve_tiny(&hub, &config_bytes()).await;

    let job = hub.run_job(&register(&hub).await).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    let lines: Vec<&str> = job.log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "Starting metadata sync for acme/tiny");
    assert_eq!(
        lines[2],
        "Synced 2 files, created 2 new artifacts, downloaded 1 metadata files"
    );

    let artifacts = hub.services.hub().list_artifacts(REPO).await.unwrap();
    assert_eq!(artifacts.len(), 2);

    let config = artifacts
        .iter()
        .find(|a| a.file_path == "config.json")
        .unwrap();
    assert_eq!(config.artifact_type, ArtifactType::Config);
    assert_eq!(config.download_status, DownloadStatus::Completed);
    let expected = hub.store_root().join("metadata/acme_tiny/config.json");
    assert_eq!(
        config.local_path.as_deref(),
        Some(expected.to_string_lossy().as_ref())
    );
    assert_eq!(std::fs::read(&expected).unwrap(), config_bytes());

    let model = artifacts
        .iter()
        .find(|a| a.file_path == "model.safetensors")
        .unwrap();
    assert_eq!(model.artifact_type, ArtifactType::Model);
    assert_eq!(model.download_status, DownloadStatus::Pending);
    assert_eq!(model.size_bytes, 2_000_000_000);
    assert!(model.local_path.is_none());

    let repositories = hub.services.hub().list_repositories().await.unwrap();
    assert_eq!(repositories[0].status, RepositoryStatus::Synced);
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let hub = TestHub::new().await;
    serve_tiny(&hub, &config_bytes()).await;
    hub.run_job(&register(&hub).await).await;
    let before = hub.services.hub().list_artifacts(REPO).await.unwrap();

    let job = hub.services.hub().submit_sync(REPO).await.unwrap();
    let job = hub.run_job(&job).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        job.last_message(),
        "Synced 2 files, created 0 new artifacts, downloaded 0 metadata files"
    );

    let after = hub.services.hub().list_artifacts(REPO).await.unwrap();
    assert_eq!(after.len(), 2);
    for artifact in &before {
        let same = after.iter().find(|a| a.id == artifact.id).unwrap();
        assert_eq!(same.file_path, artifact.file_path);
        assert_eq!(same.download_status, artifact.download_status);
    }
}

#[tokio::test]
async fn test_resync_refreshes_changed_metadata() {
    let hub = TestHub::new().await;
    serve_tiny(&hub, &config_bytes()).await;
    hub.run_job(&register(&hub).await).await;

    let updated = b"{\"hidden_size\": 16}".to_vec();
    hub.reset_remote().await;
    serve_tiny(&hub, &updated).await;

    let job = hub.services.hub().submit_sync(REPO).await.unwrap();
    let job = hub.run_job(&job).await;
    assert_eq!(
        job.last_message(),
        "Synced 2 files, created 0 new artifacts, downloaded 1 metadata files"
    );

    let config = hub.store_root().join("metadata/acme_tiny/config.json");
    assert_eq!(std::fs::read(config).unwrap(), updated);
    let artifacts = hub.services.hub().list_artifacts(REPO).await.unwrap();
    let config = artifacts
        .iter()
        .find(|a| a.file_path == "config.json")
        .unwrap();
    assert_eq!(config.size_bytes, updated.len() as u64);
}

#[tokio::test]
async fn test_sync_skips_directories_and_keeps_nested_paths() {
    let hub = TestHub::new().await;
    hub.serve_listing(
        REPO,
        vec![
            directory_entry("onnx"),
            lfs_entry_sized("onnx/model.onnx", 4_096, b"onnx"),
            lfs_entry_sized("tokenizer.model", 20_000_000, b"spm"),
        ],
    )
    .await;

    let job = hub.run_job(&register(&hub).await).await;
    assert_eq!(job.status, JobStatus::Completed);

    let artifacts = hub.services.hub().list_artifacts(REPO).await.unwrap();
    let mut paths: Vec<&str> = artifacts.iter().map(|a| a.file_path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, ["onnx/model.onnx", "tokenizer.model"]);

    // Above the inline threshold, so left for a download job
    let tokenizer = artifacts
        .iter()
        .find(|a| a.file_path == "tokenizer.model")
        .unwrap();
    assert_eq!(tokenizer.artifact_type, ArtifactType::Tokenizer);
    assert_eq!(tokenizer.download_status, DownloadStatus::Pending);
}

#[tokio::test]
async fn test_missing_remote_fails_job_and_flags_repository() {
    let hub = TestHub::new().await;
    hub.serve_missing(REPO).await;

    let job = hub.run_job(&register(&hub).await).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_message().starts_with("Error: "));

    let repositories = hub.services.hub().list_repositories().await.unwrap();
    assert_eq!(repositories[0].status, RepositoryStatus::Error);
    assert!(hub.services.hub().list_artifacts(REPO).await.unwrap().is_empty());
}
