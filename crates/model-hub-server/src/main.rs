//! Model Hub command-line entry point
//!
//! Submits sync and download jobs, queries the catalog, and runs the worker
//! pool that executes jobs until it receives Ctrl+C or SIGTERM.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use model_hub_core::{ArtifactId, JobId};
use model_hub_db::{create_pool, SqliteCatalog};
use model_hub_service::{
    CatalogJobQueue, HuggingFaceClient, RegisterRepositoryRequest, ServiceRegistry,
};
use secrecy::SecretString;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::HubConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "model-hub", author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Content store root
    #[arg(long, env = "MODEL_HUB_STORE")]
    store_root: Option<PathBuf>,

    /// Hugging Face access token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// Hugging Face endpoint
    #[arg(long, env = "HF_ENDPOINT")]
    endpoint: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool until interrupted
    Worker {
        /// Number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Register a remote repository
    Register {
        /// Remote id, e.g. "Wan-AI/Wan2.1-T2V-1.3B"
        remote_id: String,
        /// Vendor, defaults to the part of the remote id before '/'
        #[arg(long)]
        vendor: Option<String>,
        /// Name, defaults to the part of the remote id after '/'
        #[arg(long)]
        name: Option<String>,
        /// Submit a sync job right away
        #[arg(long)]
        sync: bool,
    },
    /// Submit a sync job for a registered repository
    Sync { remote_id: String },
    /// Submit a download job for an artifact
    Download { artifact_id: ArtifactId },
    /// Show one job
    Job { job_id: JobId },
    /// List recent jobs
    Jobs {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// List registered repositories
    Repos,
    /// List the artifacts of a repository
    Artifacts { remote_id: String },
    /// Re-hash a downloaded artifact and compare it with the catalog
    Verify { artifact_id: ArtifactId },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = HubConfig::load(&args.config_dir, &args.environment)
        .with_context(|| format!("Failed to load configuration from {}", args.config_dir.display()))?;

    // Override with command-line arguments
    if let Some(database_url) = args.database_url {
        config.database.url = database_url;
    }
    if let Some(store_root) = args.store_root {
        config.store.root = store_root;
    }
    if let Some(token) = args.hf_token {
        config.registry.token = Some(SecretString::new(token));
    }
    if let Some(endpoint) = args.endpoint {
        config.registry.endpoint = endpoint;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    telemetry::init_with_config(&telemetry::TelemetryConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    info!(environment = %args.environment, "Starting model hub");
    info!(database = %config.database.url, store = %config.store.root.display(), "Configuration loaded");

    let pool = create_pool(&config.pool_config())
        .await
        .context("Failed to create database connection pool")?;
    let catalog = Arc::new(SqliteCatalog::new(pool));

    let registry = Arc::new(
        HuggingFaceClient::new(config.registry_client_config())
            .context("Failed to build registry client")?,
    );

    let settings = config.hub_settings();
    let queue = Arc::new(
        CatalogJobQueue::new(catalog.clone())
            .poll_interval(config.worker.poll_interval())
            .job_timeout(settings.job_timeout),
    );
    let services = ServiceRegistry::new(catalog, registry, queue, settings);
    let hub = services.hub();

    match args.command {
        Command::Worker { concurrency } => {
            services
                .store()
                .init()
                .await
                .context("Failed to initialize content store")?;

            let concurrency = concurrency.unwrap_or(config.worker.concurrency);
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_signal(shutdown.clone()));

            services.worker_pool(concurrency).run(shutdown).await;
            info!("Worker shutdown complete");
        }
        Command::Register {
            remote_id,
            vendor,
            name,
            sync,
        } => {
            let mut request = RegisterRepositoryRequest::from_remote_id(remote_id).auto_sync(sync);
            if let Some(vendor) = vendor {
                request.vendor = vendor;
            }
            if let Some(name) = name {
                request.name = name;
            }
            print_json(&hub.register_repository(request).await?)?;
        }
        Command::Sync { remote_id } => print_json(&hub.submit_sync(&remote_id).await?)?,
        Command::Download { artifact_id } => {
            print_json(&hub.submit_download(&artifact_id).await?)?
        }
        Command::Job { job_id } => print_json(&hub.get_job(&job_id).await?)?,
        Command::Jobs { limit } => print_json(&hub.list_jobs(limit).await?)?,
        Command::Repos => print_json(&hub.list_repositories().await?)?,
        Command::Artifacts { remote_id } => print_json(&hub.list_artifacts(&remote_id).await?)?,
        Command::Verify { artifact_id } => {
            print_json(&services.integrity().verify_artifact(&artifact_id).await?)?
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or SIGINT (Ctrl+C)
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing running jobs");
        },
        _ = terminate => {
            info!("Received SIGTERM, finishing running jobs");
        },
    }

    shutdown.cancel();
}
