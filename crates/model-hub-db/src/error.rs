//! Database-specific error types and conversions
//!
//! This module provides error types for catalog operations, including
//! connection errors, query errors, and data validation errors.

use model_hub_core::HubError;
use thiserror::Error;

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Database-specific errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Database connection error
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// SQL query error
    #[error("Query error: {0}")]
    Query(String),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (duplicate key)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Foreign key violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Stored data could not be mapped back to domain types
    #[error("Invalid data format: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal database error
    #[error("Internal database error: {0}")]
    Internal(String),

    /// Domain error from core crate
    #[error("Domain error: {0}")]
    Domain(#[from] HubError),
}

impl DbError {
    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Check if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbError::ConstraintViolation(_)
                | DbError::ForeignKeyViolation(_)
                | DbError::UniqueViolation(_)
        )
    }

    /// Check if this error is a duplicate/already exists error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DbError::AlreadyExists(_) | DbError::UniqueViolation(_))
    }

    /// Check if this is a transient error that could be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Pool(_))
    }
}

/// Convert SQLx database errors to our error type
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound("No rows returned".to_string()),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                if db_err.is_unique_violation() || message.contains("UNIQUE constraint failed") {
                    DbError::UniqueViolation(message)
                } else if db_err.is_foreign_key_violation()
                    || message.contains("FOREIGN KEY constraint failed")
                {
                    DbError::ForeignKeyViolation(message)
                } else if db_err.is_check_violation() {
                    DbError::ConstraintViolation(message)
                } else if message.contains("database is locked") {
                    DbError::Connection(message)
                } else {
                    DbError::Query(message)
                }
            }

            sqlx::Error::PoolTimedOut => DbError::Pool("Connection pool timeout".to_string()),

            sqlx::Error::PoolClosed => DbError::Pool("Connection pool closed".to_string()),

            sqlx::Error::Io(io_err) => DbError::Connection(format!("I/O error: {}", io_err)),

            sqlx::Error::Protocol(msg) => DbError::Connection(format!("Protocol error: {}", msg)),

            sqlx::Error::ColumnNotFound(col) => {
                DbError::InvalidData(format!("Column not found: {}", col))
            }

            sqlx::Error::Decode(msg) => DbError::Serialization(format!("Decode error: {}", msg)),

            sqlx::Error::Migrate(migrate_err) => DbError::Migration(format!("{}", migrate_err)),

            _ => DbError::Internal(format!("{}", err)),
        }
    }
}

/// Convert SQLx migration errors
impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(format!("{}", err))
    }
}

/// Convert serde_json errors
impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(format!("{}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = DbError::NotFound("test".to_string());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_constraint_violation());

        let unique = DbError::UniqueViolation("test".to_string());
        assert!(unique.is_constraint_violation());
        assert!(unique.is_already_exists());

        let connection = DbError::Connection("test".to_string());
        assert!(connection.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = DbError::NotFound("repository gpt2".to_string());
        assert_eq!(err.to_string(), "Not found: repository gpt2");

        let err = DbError::from(HubError::JobNotFound("01H".to_string()));
        assert_eq!(err.to_string(), "Domain error: Job not found: 01H");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(DbError::from(sqlx::Error::RowNotFound).is_not_found());
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_transient());
    }
}
