//! Repository synchronization
//!
//! Reconciles the catalog with the remote listing of a registered repository.
//! All network I/O (listing, inline metadata fetches) happens first; the
//! resulting artifact changes and the repository status are then committed in
//! one catalog transaction.

use chrono::Utc;
use model_hub_core::classify::is_metadata;
use model_hub_core::{classify, Artifact, RemoteFile, RepositoryStatus};
use model_hub_db::{ArtifactChange, CatalogRepository, FetchedMetadata, SyncChangeset};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::dto::SyncSummary;
use crate::error::{ServiceError, ServiceResult};
use crate::registry::{ModelRegistryClient, RegistryError};
use crate::settings::HubSettings;
use crate::store::ContentStore;

/// Result of the best-effort inline fetch of one metadata file
enum MetadataFetch {
    Fetched(FetchedMetadata),
    /// Not eligible, or already present and unchanged
    Skipped,
    Failed,
}

/// Syncs registered repositories against the remote registry
pub struct SyncOrchestrator {
    catalog: Arc<dyn CatalogRepository>,
    registry: Arc<dyn ModelRegistryClient>,
    store: ContentStore,
    settings: HubSettings,
}

impl SyncOrchestrator {
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

    /// Sync one repository, identified by its remote id
    #[instrument(skip(self))]
    pub async fn sync_repository(&self, remote_id: &str) -> ServiceResult<SyncSummary> {
        let repository = self
            .catalog
            .find_repository_by_remote_id(remote_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("repository {}", remote_id)))?;

        let files = match self
            .registry
            .list_files(remote_id, &self.settings.revision)
            .await
        {
            Ok(files) => files,
            Err(RegistryError::RepositoryNotFound(msg)) => {
                if let Err(e) = self
                    .catalog
                    .set_repository_status(&repository.id, RepositoryStatus::Error)
                    .await
                {
                    warn!(error = %e, "Failed to mark repository as errored");
                }
                return Err(ServiceError::RemoteRepositoryNotFound(msg));
            }
            Err(e) => return Err(e.into()),
        };

        let existing: HashMap<String, Artifact> = self
            .catalog
            .list_artifacts(&repository.id)
            .await?
            .into_iter()
            .map(|artifact| (artifact.file_path.clone(), artifact))
            .collect();
        let metadata_dir = self.store.metadata_dir(remote_id)?;

        let mut changeset = SyncChangeset::new(repository.id);
        let mut metadata_downloaded = 0usize;

        for file in &files {
            let current = existing.get(&file.path);
            let artifact_type = current
                .map(|artifact| artifact.artifact_type)
                .unwrap_or_else(|| classify(&file.path));

            let fetch = if is_metadata(artifact_type)
                && file.size < self.settings.metadata_size_threshold
            {
                self.fetch_metadata(remote_id, file, current, &metadata_dir)
                    .await
            } else {
                MetadataFetch::Skipped
            };

            let mut fetched = None;
            let mut failed = false;
            match fetch {
                MetadataFetch::Fetched(metadata) => {
                    metadata_downloaded += 1;
                    fetched = Some(metadata);
                }
                MetadataFetch::Failed => failed = true,
                MetadataFetch::Skipped => {}
            }

            match current {
                // The file on disk is still the old version: keep describing it
                // so the next sync sees the change and fetches again
                Some(artifact) if failed && artifact.is_completed() => {
                    changeset.push(ArtifactChange::Refreshed {
                        id: artifact.id,
                        size_bytes: artifact.size_bytes,
                        content_hash: artifact.content_hash.clone(),
                        fetched: None,
                    })
                }
                Some(artifact) => changeset.push(ArtifactChange::Refreshed {
                    id: artifact.id,
                    size_bytes: file.size,
                    content_hash: file.content_digest.clone(),
                    fetched,
                }),
                None => {
                    let mut artifact = Artifact::new_from_remote(repository.id, file);
                    if let Some(fetched) = fetched {
                        artifact.mark_completed(fetched.local_path, fetched.verified_at);
                    }
                    changeset.push(ArtifactChange::Created(artifact));
                }
            }
        }

        let summary = SyncSummary {
            files_seen: files.len(),
            artifacts_created: changeset.created_count(),
            metadata_downloaded,
        };
        self.catalog.apply_sync(changeset).await?;

        info!(
            repository = %repository.label(),
            files = summary.files_seen,
            created = summary.artifacts_created,
            metadata = summary.metadata_downloaded,
            "Repository synced"
        );
        Ok(summary)
    }

    /// Fetch a small config or tokenizer file next to the other metadata of
    /// its repository. A failed fetch never fails the sync.
    async fn fetch_metadata(
        &self,
        remote_id: &str,
        file: &RemoteFile,
        current: Option<&Artifact>,
        metadata_dir: &Path,
    ) -> MetadataFetch {
        if let Some(artifact) = current {
            let unchanged = artifact.is_completed()
                && artifact.content_hash.is_some()
                && artifact.content_hash == file.content_digest;
            if unchanged {
                if let Some(local_path) = &artifact.local_path {
                    if tokio::fs::metadata(local_path).await.is_ok() {
                        debug!(path = %file.path, "Metadata unchanged, skipping fetch");
                        return MetadataFetch::Skipped;
                    }
                }
            }
        }

        match self
            .registry
            .fetch_file(remote_id, &file.path, &self.settings.revision, metadata_dir)
            .await
        {
            Ok(local_path) => MetadataFetch::Fetched(FetchedMetadata {
                local_path: local_path.to_string_lossy().into_owned(),
                verified_at: Utc::now(),
            }),
            Err(e) => {
                warn!(path = %file.path, error = %e, "Failed to fetch metadata file");
                MetadataFetch::Failed
            }
        }
    }
}
