use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportJobStatus {
    pub fn to_db_status(&self) -> &'static str {
        match self {
            ImportJobStatus::Pending => "pending",
            ImportJobStatus::Processing => "processing",
            ImportJobStatus::Completed => "completed",
            ImportJobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// Import job entity: one batch import attempt and its outcome counters
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub file_name: String,
    pub status: String,
    pub total_records: i32,
    pub processed_ok: i32,
    pub processed_errors: i32,
    pub error_details: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Repository for import jobs
pub struct ImportJobRepository {
    pool: PgPool,
}

impl ImportJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pending job for a named file
    pub async fn create(&self, agency_id: Uuid, file_name: &str) -> DbResult<ImportJob> {
        sqlx::query_as::<_, ImportJob>(
            "INSERT INTO import_jobs (agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details)
             VALUES ($1, $2, 'pending', 0, 0, 0, '[]'::jsonb)
             RETURNING id, agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details, started_at, completed_at, created_at",
        )
        .bind(agency_id)
        .bind(file_name)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Move a job to processing and stamp its start time
    pub async fn mark_processing(&self, id: Uuid) -> DbResult<ImportJob> {
        sqlx::query_as::<_, ImportJob>(
            "UPDATE import_jobs SET status = 'processing', started_at = now()
             WHERE id = $1
             RETURNING id, agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details, started_at, completed_at, created_at",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Update running counters between batches so a watcher can follow progress
    pub async fn update_progress(
        &self,
        id: Uuid,
        total_records: i32,
        processed_ok: i32,
        processed_errors: i32,
        error_details: &serde_json::Value,
    ) -> DbResult<ImportJob> {
        sqlx::query_as::<_, ImportJob>(
            "UPDATE import_jobs
             SET total_records = $2, processed_ok = $3, processed_errors = $4, error_details = $5
             WHERE id = $1
             RETURNING id, agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details, started_at, completed_at, created_at",
        )
        .bind(id)
        .bind(total_records)
        .bind(processed_ok)
        .bind(processed_errors)
        .bind(error_details)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record the final counters and terminal status of a job
    pub async fn finalize(
        &self,
        id: Uuid,
        status: ImportJobStatus,
        total_records: i32,
        processed_ok: i32,
        processed_errors: i32,
        error_details: &serde_json::Value,
    ) -> DbResult<ImportJob> {
        sqlx::query_as::<_, ImportJob>(
            "UPDATE import_jobs
             SET status = $2, total_records = $3, processed_ok = $4, processed_errors = $5, error_details = $6, completed_at = now()
             WHERE id = $1
             RETURNING id, agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details, started_at, completed_at, created_at",
        )
        .bind(id)
        .bind(status.to_db_status())
        .bind(total_records)
        .bind(processed_ok)
        .bind(processed_errors)
        .bind(error_details)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for ImportJobRepository {
    type Entity = ImportJob;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, ImportJob>(
            "SELECT id, agency_id, file_name, status, total_records, processed_ok, processed_errors, error_details, started_at, completed_at, created_at
             FROM import_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

impl TransactionalRepository for ImportJobRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}
