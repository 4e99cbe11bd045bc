//! SQLite implementation of CatalogRepository
//!
//! Statuses, kinds and ids are stored as their string forms; job payloads as
//! JSON text. Timestamps go through sqlx's chrono encoding, which keeps them
//! comparable as text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model_hub_core::job::sanitize_log_message;
use model_hub_core::{
    Artifact, ArtifactId, DownloadStatus, HubError, Job, JobId, JobPayload, JobStatus, Repository,
    RepositoryId, RepositoryStatus,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::error::{DbError, DbResult};
use crate::repository::{ArtifactChange, CatalogRepository, JobTransition, SyncChangeset};

const REPOSITORY_COLUMNS: &str =
    "id, vendor, name, source, remote_id, status, created_at, updated_at";

const ARTIFACT_COLUMNS: &str = "id, repository_id, file_path, artifact_type, model_format, \
     model_precision, size_bytes, content_hash, download_status, local_path, last_verified_at, \
     created_at, updated_at";

const JOB_COLUMNS: &str = "id, kind, status, payload, log, attempts, created_at, updated_at";

/// SQLite implementation of CatalogRepository
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Create a new SQLite catalog
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_change(
        tx: &mut Transaction<'_, Sqlite>,
        change: &ArtifactChange,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        match change {
            ArtifactChange::Created(artifact) => {
                sqlx::query(
                    r#"
                    INSERT INTO artifacts (
                        id, repository_id, file_path, artifact_type, model_format,
                        model_precision, size_bytes, content_hash, download_status,
                        local_path, last_verified_at, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (repository_id, file_path) DO UPDATE SET
                        size_bytes = excluded.size_bytes,
                        content_hash = excluded.content_hash,
                        updated_at = excluded.updated_at,
                        download_status = CASE WHEN excluded.download_status = 'completed'
                            THEN 'completed' ELSE artifacts.download_status END,
                        local_path = CASE WHEN excluded.download_status = 'completed'
                            THEN excluded.local_path ELSE artifacts.local_path END,
                        last_verified_at = CASE WHEN excluded.download_status = 'completed'
                            THEN excluded.last_verified_at ELSE artifacts.last_verified_at END
                    "#,
                )
                .bind(artifact.id.to_string())
                .bind(artifact.repository_id.to_string())
                .bind(&artifact.file_path)
                .bind(artifact.artifact_type.as_str())
                .bind(artifact.format.map(|f| f.as_str()))
                .bind(artifact.precision.map(|p| p.as_str()))
                .bind(size_to_db(artifact.size_bytes)?)
                .bind(&artifact.content_hash)
                .bind(artifact.download_status.as_str())
                .bind(&artifact.local_path)
                .bind(artifact.last_verified_at)
                .bind(artifact.created_at)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            ArtifactChange::Refreshed {
                id,
                size_bytes,
                content_hash,
                fetched: None,
            } => {
                sqlx::query(
                    r#"
                    UPDATE artifacts
                    SET size_bytes = ?, content_hash = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(size_to_db(*size_bytes)?)
                .bind(content_hash)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
            }
            ArtifactChange::Refreshed {
                id,
                size_bytes,
                content_hash,
                fetched: Some(fetched),
            } => {
                sqlx::query(
                    r#"
                    UPDATE artifacts
                    SET size_bytes = ?, content_hash = ?, updated_at = ?,
                        local_path = ?, download_status = 'completed', last_verified_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(size_to_db(*size_bytes)?)
                .bind(content_hash)
                .bind(now)
                .bind(&fetched.local_path)
                .bind(fetched.verified_at)
                .bind(id.to_string())
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalog {
    #[instrument(skip(self, repository), fields(remote_id = %repository.remote_id))]
    async fn create_repository(&self, repository: Repository) -> DbResult<Repository> {
        debug!("Creating repository in catalog");

        let result = sqlx::query(
            r#"
            INSERT INTO repositories (id, vendor, name, source, remote_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(repository.id.to_string())
        .bind(&repository.vendor)
        .bind(&repository.name)
        .bind(&repository.source)
        .bind(&repository.remote_id)
        .bind(repository.status.as_str())
        .bind(repository.created_at)
        .bind(repository.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(repository),
            Err(err) => match DbError::from(err) {
                DbError::UniqueViolation(_) => Err(DbError::AlreadyExists(format!(
                    "repository {}",
                    repository.remote_id
                ))),
                other => Err(other),
            },
        }
    }

    #[instrument(skip(self), fields(repository_id = %id))]
    async fn find_repository(&self, id: &RepositoryId) -> DbResult<Option<Repository>> {
        let sql = format!("SELECT {} FROM repositories WHERE id = ?", REPOSITORY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_repository(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn find_repository_by_remote_id(
        &self,
        remote_id: &str,
    ) -> DbResult<Option<Repository>> {
        let sql = format!(
            "SELECT {} FROM repositories WHERE remote_id = ?",
            REPOSITORY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_repository(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_repositories(&self) -> DbResult<Vec<Repository>> {
        let sql = format!(
            "SELECT {} FROM repositories ORDER BY created_at ASC, id ASC",
            REPOSITORY_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_repository).collect()
    }

    #[instrument(skip(self), fields(repository_id = %id, status = %status))]
    async fn set_repository_status(
        &self,
        id: &RepositoryId,
        status: RepositoryStatus,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE repositories SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("repository {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(artifact_id = %id))]
    async fn find_artifact(&self, id: &ArtifactId) -> DbResult<Option<Artifact>> {
        let sql = format!("SELECT {} FROM artifacts WHERE id = ?", ARTIFACT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_artifact(&r)).transpose()
    }

    #[instrument(skip(self), fields(repository_id = %repository_id))]
    async fn find_artifact_by_path(
        &self,
        repository_id: &RepositoryId,
        file_path: &str,
    ) -> DbResult<Option<Artifact>> {
        let sql = format!(
            "SELECT {} FROM artifacts WHERE repository_id = ? AND file_path = ?",
            ARTIFACT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(repository_id.to_string())
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_artifact(&r)).transpose()
    }

    #[instrument(skip(self), fields(repository_id = %repository_id))]
    async fn list_artifacts(&self, repository_id: &RepositoryId) -> DbResult<Vec<Artifact>> {
        let sql = format!(
            "SELECT {} FROM artifacts WHERE repository_id = ? ORDER BY file_path ASC",
            ARTIFACT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(repository_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_artifact).collect()
    }

    #[instrument(skip(self, content_hash), fields(artifact_id = %id))]
    async fn complete_download(
        &self,
        id: &ArtifactId,
        local_path: &str,
        content_hash: &str,
        verified_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!("Recording completed download");

        let result = sqlx::query(
            r#"
            UPDATE artifacts
            SET local_path = ?, content_hash = ?, download_status = ?,
                last_verified_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(local_path)
        .bind(content_hash)
        .bind(DownloadStatus::Completed.as_str())
        .bind(verified_at)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("artifact {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(artifact_id = %id))]
    async fn record_verification(
        &self,
        id: &ArtifactId,
        verified_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE artifacts SET last_verified_at = ?, updated_at = ? WHERE id = ?")
                .bind(verified_at)
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("artifact {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(artifact_id = %id, status = %status))]
    async fn set_download_status(&self, id: &ArtifactId, status: DownloadStatus) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE artifacts SET download_status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("artifact {}", id)));
        }
        Ok(())
    }

    #[instrument(
        skip(self, changeset),
        fields(repository_id = %changeset.repository_id, changes = changeset.changes.len())
    )]
    async fn apply_sync(&self, changeset: SyncChangeset) -> DbResult<()> {
        debug!("Applying sync changeset");

        let mut tx = self.pool.begin().await?;

        for change in &changeset.changes {
            Self::apply_change(&mut tx, change, changeset.updated_at).await?;
        }

        let result = sqlx::query("UPDATE repositories SET status = ?, updated_at = ? WHERE id = ?")
            .bind(changeset.status.as_str())
            .bind(changeset.updated_at)
            .bind(changeset.repository_id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the artifact writes
            return Err(DbError::NotFound(format!(
                "repository {}",
                changeset.repository_id
            )));
        }

        tx.commit().await?;
        debug!("Sync changeset committed");
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    async fn create_job(&self, job: Job) -> DbResult<Job> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, status, payload, log, attempts, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.payload)?)
        .bind(&job.log)
        .bind(i64::from(job.attempts))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn find_job(&self, id: &JobId) -> DbResult<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_jobs(&self, limit: i64) -> DbResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    #[instrument(skip(self, message), fields(job_id = %id))]
    async fn claim_job(
        &self,
        id: &JobId,
        message: &str,
        stale_before: Option<DateTime<Utc>>,
    ) -> DbResult<Option<Job>> {
        let line = sanitize_log_message(message);
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                log = CASE WHEN log = '' THEN ? ELSE log || char(10) || ? END,
                updated_at = ?
            WHERE id = ?
              AND (status = 'pending'
                   OR (status = 'running' AND ? IS NOT NULL AND updated_at < ?))
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&line)
            .bind(&line)
            .bind(Utc::now())
            .bind(id.to_string())
            .bind(stale_before)
            .bind(stale_before)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .next();

        match row {
            Some(row) => {
                let job = row_to_job(&row)?;
                debug!(attempts = job.attempts, "Job claimed");
                Ok(Some(job))
            }
            None => match self.find_job(id).await? {
                Some(_) => Ok(None),
                None => Err(DbError::NotFound(format!("job {}", id))),
            },
        }
    }

    #[instrument(skip(self, transition), fields(job_id = %id, from = %transition.from, to = %transition.to))]
    async fn transition_job(
        &self,
        id: &JobId,
        transition: JobTransition,
    ) -> DbResult<Option<Job>> {
        if !transition.from.can_transition_to(transition.to) {
            return Err(HubError::InvalidTransition {
                from: transition.from.to_string(),
                to: transition.to.to_string(),
            }
            .into());
        }

        let line = sanitize_log_message(&transition.message);
        let attempt = transition.attempt.map(i64::from);
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = ?,
                log = CASE WHEN log = '' THEN ? ELSE log || char(10) || ? END,
                updated_at = ?
            WHERE id = ? AND status = ? AND (? IS NULL OR attempts = ?)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(transition.to.as_str())
            .bind(&line)
            .bind(&line)
            .bind(Utc::now())
            .bind(id.to_string())
            .bind(transition.from.as_str())
            .bind(attempt)
            .bind(attempt)
            // Step to completion so the autocommit write is committed
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .next();

        match row {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => match self.find_job(id).await? {
                Some(current) => {
                    debug!(current = %current.status, "Job transition skipped");
                    Ok(None)
                }
                None => Err(DbError::NotFound(format!("job {}", id))),
            },
        }
    }

    #[instrument(skip(self))]
    async fn claimable_jobs(
        &self,
        stale_before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> DbResult<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {} FROM jobs
            WHERE status = 'pending'
               OR (status = 'running' AND ? IS NOT NULL AND updated_at < ?)
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(stale_before)
            .bind(stale_before)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connection(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

fn size_to_db(size: u64) -> DbResult<i64> {
    i64::try_from(size).map_err(|_| DbError::InvalidData(format!("size out of range: {}", size)))
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> DbResult<T>
where
    T: FromStr<Err = HubError>,
{
    let value: String = row.try_get(column)?;
    T::from_str(&value).map_err(|e| DbError::InvalidData(format!("{}: {}", column, e)))
}

fn parse_optional_column<T>(row: &SqliteRow, column: &str) -> DbResult<Option<T>>
where
    T: FromStr<Err = HubError>,
{
    let value: Option<String> = row.try_get(column)?;
    value
        .map(|v| T::from_str(&v).map_err(|e| DbError::InvalidData(format!("{}: {}", column, e))))
        .transpose()
}

fn row_to_repository(row: &SqliteRow) -> DbResult<Repository> {
    Ok(Repository {
        id: parse_column(row, "id")?,
        vendor: row.try_get("vendor")?,
        name: row.try_get("name")?,
        source: row.try_get("source")?,
        remote_id: row.try_get("remote_id")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_artifact(row: &SqliteRow) -> DbResult<Artifact> {
    let size_bytes: i64 = row.try_get("size_bytes")?;
    Ok(Artifact {
        id: parse_column(row, "id")?,
        repository_id: parse_column(row, "repository_id")?,
        file_path: row.try_get("file_path")?,
        artifact_type: parse_column(row, "artifact_type")?,
        format: parse_optional_column(row, "model_format")?,
        precision: parse_optional_column(row, "model_precision")?,
        size_bytes: u64::try_from(size_bytes)
            .map_err(|_| DbError::InvalidData(format!("negative size: {}", size_bytes)))?,
        content_hash: row.try_get("content_hash")?,
        download_status: parse_column(row, "download_status")?,
        local_path: row.try_get("local_path")?,
        last_verified_at: row.try_get("last_verified_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_job(row: &SqliteRow) -> DbResult<Job> {
    let payload_json: String = row.try_get("payload")?;
    let payload: JobPayload = serde_json::from_str(&payload_json)?;
    let attempts: i64 = row.try_get("attempts")?;
    let status: JobStatus = parse_column(row, "status")?;

    Ok(Job {
        id: parse_column(row, "id")?,
        kind: parse_column(row, "kind")?,
        status,
        payload,
        log: row.try_get("log")?,
        attempts: u32::try_from(attempts)
            .map_err(|_| DbError::InvalidData(format!("invalid attempts: {}", attempts)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
