//! Service layer for the Model Hub
//!
//! This crate provides the pipeline that sits between callers and the catalog:
//! it talks to the remote registry, stores fetched files, and runs the jobs
//! that keep the catalog in step with the registry.
//!
//! # Architecture
//!
//! The service layer is organized into the following components:
//!
//! - **HubService**: Repository registration, job submission and catalog reads
//! - **SyncOrchestrator**: Reconciles a repository's remote listing with the catalog
//! - **DownloadOrchestrator**: Fetches an artifact into the content store
//! - **JobTracker**: Persists the lifecycle of each job around an orchestration
//! - **WorkerPool**: Pulls jobs from a [`JobQueue`] and dispatches them
//! - **IntegrityService**: Streaming checksums and re-verification of artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use model_hub_service::{
//!     ChannelJobQueue, HubSettings, HuggingFaceClient, RegisterRepositoryRequest,
//!     RegistryClientConfig, ServiceRegistry,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     catalog: Arc<dyn model_hub_db::CatalogRepository>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(HuggingFaceClient::new(RegistryClientConfig::default())?);
//! let queue = Arc::new(ChannelJobQueue::new());
//! let services = ServiceRegistry::new(catalog, registry, queue, HubSettings::default());
//!
//! let response = services
//!     .hub()
//!     .register_repository(RegisterRepositoryRequest::from_remote_id("openai-community/gpt2"))
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod download;
pub mod dto;
pub mod error;
pub mod hub;
pub mod integrity;
pub mod queue;
pub mod registry;
pub mod settings;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use dto::*;
pub use error::{ServiceError, ServiceResult};

// Re-export service traits and implementations
pub use download::DownloadOrchestrator;
pub use hub::{DefaultHubService, HubService};
pub use integrity::{hash_file, DefaultIntegrityService, IntegrityService};
pub use queue::{CatalogJobQueue, ChannelJobQueue, JobQueue};
pub use registry::{
    HuggingFaceClient, ModelRegistryClient, RegistryClientConfig, RegistryError,
};
pub use settings::HubSettings;
pub use store::{CommitOutcome, ContentStore, StoreError};
pub use sync::SyncOrchestrator;
pub use tracker::JobTracker;
pub use worker::{JobDispatcher, WorkerPool};

use model_hub_db::CatalogRepository;
use std::sync::Arc;

/// Service registry that holds all service instances
///
/// This provides a convenient way to manage all services together
/// and ensures consistent dependency injection.
#[derive(Clone)]
pub struct ServiceRegistry {
    /// Registration, submission and catalog reads
    pub hub: Arc<dyn HubService>,
    /// Artifact re-verification
    pub integrity: Arc<dyn IntegrityService>,
    /// Job execution used by workers
    pub dispatcher: Arc<JobDispatcher>,
    queue: Arc<dyn JobQueue>,
    store: ContentStore,
}

impl ServiceRegistry {
    /// Create a new service registry with default implementations
    ///
    /// # Arguments
    ///
    /// * `catalog` - Catalog repository implementation
    /// * `registry` - Remote model registry client
    /// * `queue` - Job queue shared by submission and workers
    /// * `settings` - Store, revision and timeout settings
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        registry: Arc<dyn ModelRegistryClient>,
        queue: Arc<dyn JobQueue>,
        settings: HubSettings,
    ) -> Self {
        let store = ContentStore::new(&settings.store_root, settings.hash_algorithm);

        let hub = Arc::new(DefaultHubService::new(catalog.clone(), queue.clone()));
        let integrity = Arc::new(DefaultIntegrityService::new(
            catalog.clone(),
            settings.hash_algorithm,
        ));

        let dispatcher = Arc::new(JobDispatcher::new(
            JobTracker::new(catalog.clone(), settings.job_timeout),
            SyncOrchestrator::new(
                catalog.clone(),
                registry.clone(),
                store.clone(),
                settings.clone(),
            ),
            DownloadOrchestrator::new(catalog, registry, store.clone(), settings),
        ));

        Self {
            hub,
            integrity,
            dispatcher,
            queue,
            store,
        }
    }

    /// Get the hub service
    pub fn hub(&self) -> &Arc<dyn HubService> {
        &self.hub
    }

    /// Get the integrity service
    pub fn integrity(&self) -> &Arc<dyn IntegrityService> {
        &self.integrity
    }

    /// Get the job dispatcher
    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    /// Content store the orchestrators write to
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Worker pool consuming this registry's queue
    pub fn worker_pool(&self, concurrency: usize) -> WorkerPool {
        WorkerPool::new(self.queue.clone(), self.dispatcher.clone(), concurrency)
    }
}
