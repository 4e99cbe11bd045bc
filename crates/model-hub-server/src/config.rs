//! Hub configuration
//!
//! This module handles hierarchical configuration loading from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - Environment variables
//! - Command-line arguments (applied by the caller)

use config::{Config, ConfigError, Environment, File};
use model_hub_core::HashAlgorithm;
use model_hub_db::PoolConfig;
use model_hub_service::registry::DEFAULT_ENDPOINT;
use model_hub_service::settings::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_METADATA_SIZE_THRESHOLD,
    DEFAULT_REVISION,
};
use model_hub_service::{HubSettings, RegistryClientConfig};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Catalog database settings
    pub database: DatabaseConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Content store settings
    pub store: StoreConfig,

    /// Remote registry settings
    pub registry: RegistryConfig,

    /// Worker pool settings
    pub worker: WorkerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,

    /// How long a write waits on a locked database, in seconds
    pub busy_timeout_seconds: u64,

    /// Run migrations on startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/model-hub.db".to_string(),
            max_connections: 5,
            connect_timeout_seconds: 10,
            busy_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Use JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub include_timestamps: bool,

    /// Include thread IDs
    pub include_thread_ids: bool,

    /// Include target module
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_timestamps: true,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

/// Content store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for blobs, metadata and staging
    pub root: PathBuf,

    /// Algorithm used to address blobs
    pub hash_algorithm: HashAlgorithm,

    /// Config and tokenizer files smaller than this are fetched during sync
    pub metadata_size_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/store"),
            hash_algorithm: HashAlgorithm::default(),
            metadata_size_threshold: DEFAULT_METADATA_SIZE_THRESHOLD,
        }
    }
}

/// Remote registry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the Hugging Face Hub
    pub endpoint: String,

    /// Access token for gated or private repositories
    pub token: Option<SecretString>,

    /// Git revision to sync and download
    pub revision: String,

    /// Listing request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Override for the User-Agent header
    pub user_agent: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            revision: DEFAULT_REVISION.to_string(),
            request_timeout_seconds: 30,
            user_agent: None,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Delay between catalog polls when idle, in milliseconds
    pub poll_interval_ms: u64,

    /// Deadline for a whole job in seconds (0 disables it)
    pub job_timeout_seconds: u64,

    /// Deadline for one artifact download in seconds (0 disables it)
    pub download_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_ms: 2_000,
            job_timeout_seconds: DEFAULT_JOB_TIMEOUT_SECS,
            download_timeout_seconds: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn optional_seconds(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        optional_seconds(self.job_timeout_seconds)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        optional_seconds(self.download_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl HubConfig {
    /// Load configuration from files and environment
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default configuration file (config/default.toml)
    /// 2. Environment-specific file (config/{env}.toml)
    /// 3. Environment variables (MODEL_HUB__*)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or parsed
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", environment))).required(false))
            // e.g., MODEL_HUB__WORKER__CONCURRENCY=4
            .add_source(
                Environment::with_prefix("MODEL_HUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Catalog pool settings
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.database.url)
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_seconds))
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_seconds))
            .run_migrations(self.database.run_migrations)
            .enable_logging(self.logging.level == "trace")
    }

    /// Settings for the sync and download pipeline
    pub fn hub_settings(&self) -> HubSettings {
        HubSettings::new(&self.store.root)
            .revision(self.registry.revision.clone())
            .metadata_size_threshold(self.store.metadata_size_threshold)
            .hash_algorithm(self.store.hash_algorithm)
            .job_timeout(self.worker.job_timeout())
            .download_timeout(self.worker.download_timeout())
    }

    /// Settings for the Hugging Face client
    pub fn registry_client_config(&self) -> RegistryClientConfig {
        let config = RegistryClientConfig::new(&self.registry.endpoint)
            .token(self.registry.token.clone())
            .timeout(Duration::from_secs(self.registry.request_timeout_seconds));
        match &self.registry.user_agent {
            Some(user_agent) => config.user_agent(user_agent.clone()),
            None => config,
        }
    }
}
