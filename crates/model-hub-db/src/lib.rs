//! Catalog persistence for the Model Hub
//!
//! This crate provides database persistence for the Model Hub, including:
//! - Connection pool management for SQLite
//! - The `CatalogRepository` trait over repositories, artifacts and jobs
//! - A SQLite implementation with SQLx
//! - Embedded database migrations
//! - Error handling mapped from driver error kinds
//!
//! # Example
//!
//! ```rust,no_run
//! use model_hub_db::{create_pool, CatalogRepository, PoolConfig, SqliteCatalog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::new("sqlite://data/model-hub.db").max_connections(5);
//! let pool = create_pool(&config).await?;
//!
//! let catalog = SqliteCatalog::new(pool);
//! let repositories = catalog.list_repositories().await?;
//! # let _ = repositories;
//! # Ok(())
//! # }
//! ```

// Re-export core domain types for convenience
pub use model_hub_core;

pub mod error;
pub mod pool;
pub mod repository;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use pool::{close_pool, create_pool, run_migrations, verify_pool_health, PoolConfig};
pub use repository::{
    ArtifactChange, CatalogRepository, FetchedMetadata, JobTransition, SyncChangeset,
    DEFAULT_JOB_LIST_LIMIT,
};
pub use sqlite::SqliteCatalog;

// Re-export sqlx types that users may need
pub use sqlx::sqlite::SqlitePool;

/// Database layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default database URL environment variable name
pub const DEFAULT_DATABASE_URL_ENV: &str = "DATABASE_URL";
