use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::Repository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Payment processor registry entry
#[derive(Debug, Clone, FromRow)]
pub struct Processor {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub api_base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to register a processor
#[derive(Debug, Clone)]
pub struct NewProcessorRecord {
    pub name: String,
    pub slug: String,
    pub api_base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
}

/// Repository for the processor registry
pub struct ProcessorRepository {
    pool: PgPool,
}

impl ProcessorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a processor that is present and active
    pub async fn find_active(&self, id: Uuid) -> DbResult<Option<Processor>> {
        sqlx::query_as::<_, Processor>(
            "SELECT id, name, slug, api_base_url, api_key, webhook_secret, is_active, created_at, updated_at
             FROM processors WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Register a new active processor
    pub async fn insert(&self, record: &NewProcessorRecord) -> DbResult<Processor> {
        sqlx::query_as::<_, Processor>(
            "INSERT INTO processors (name, slug, api_base_url, api_key, webhook_secret, is_active)
             VALUES ($1, $2, $3, $4, $5, true)
             RETURNING id, name, slug, api_base_url, api_key, webhook_secret, is_active, created_at, updated_at",
        )
        .bind(&record.name)
        .bind(&record.slug)
        .bind(&record.api_base_url)
        .bind(&record.api_key)
        .bind(&record.webhook_secret)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for ProcessorRepository {
    type Entity = Processor;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, Processor>(
            "SELECT id, name, slug, api_base_url, api_key, webhook_secret, is_active, created_at, updated_at
             FROM processors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
