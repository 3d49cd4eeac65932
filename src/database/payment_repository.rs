use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{Repository, TransactionalRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Transaction as SqlxTransaction;
use sqlx::{FromRow, PgPool, Postgres};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a payment attempt. Transitions are one-directional except
/// completed -> refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn to_db_status(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// How the debtor paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Check,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment entity: one money movement attempt against an account
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub processor_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub processor_ref: Option<String>,
    pub idempotency_key: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending.to_db_status()
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed.to_db_status()
    }

    pub fn is_refunded(&self) -> bool {
        self.status == PaymentStatus::Refunded.to_db_status()
    }
}

/// Fields required to persist a new pending payment
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub account_id: Uuid,
    pub processor_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub idempotency_key: String,
}

/// Repository for payment rows
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a payment by its idempotency key
    pub async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at
             FROM payments WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find a payment by the processor's external reference
    pub async fn find_by_processor_ref(&self, processor_ref: &str) -> DbResult<Option<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at
             FROM payments WHERE processor_ref = $1",
        )
        .bind(processor_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Insert a new payment in pending status
    pub async fn insert_pending(&self, record: &NewPaymentRecord) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (account_id, processor_id, amount, method, status, idempotency_key, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, '{}'::jsonb)
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(record.account_id)
        .bind(record.processor_id)
        .bind(record.amount)
        .bind(record.method.as_str())
        .bind(PaymentStatus::Pending.to_db_status())
        .bind(&record.idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a payment failed, merging an error description into its metadata
    pub async fn mark_failed(&self, id: Uuid, patch: &serde_json::Value) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'failed', metadata = metadata || $2
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(patch)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a payment completed, merging confirmation data into its metadata.
    /// Used by webhook confirmation and reconciliation where the processor
    /// reference is already known.
    pub async fn confirm_completed(&self, id: Uuid, patch: &serde_json::Value) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'completed', metadata = metadata || $2
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(patch)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a payment refunded, merging refund details into its metadata
    pub async fn mark_refunded(&self, id: Uuid, patch: &serde_json::Value) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'refunded', metadata = metadata || $2
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(patch)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Merge a patch into the payment metadata without touching status
    pub async fn merge_metadata(&self, id: Uuid, patch: &serde_json::Value) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET metadata = metadata || $2
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(patch)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Pending payments older than the cutoff, oldest first
    pub async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at
             FROM payments
             WHERE status = 'pending' AND created_at < $1
             ORDER BY created_at ASC
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Lock a payment row for the remainder of the transaction
    pub async fn find_by_id_for_update(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
    ) -> DbResult<Option<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at
             FROM payments WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a payment completed with its processor reference, replacing the
    /// metadata with the charge result
    pub async fn mark_completed_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        processor_ref: &str,
        metadata: &serde_json::Value,
    ) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'completed', processor_ref = $2, metadata = $3
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(processor_ref)
        .bind(metadata)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Mark a payment refunded, merging refund details into its metadata
    pub async fn mark_refunded_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        id: Uuid,
        patch: &serde_json::Value,
    ) -> DbResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = 'refunded', metadata = metadata || $2
             WHERE id = $1
             RETURNING id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at",
        )
        .bind(id)
        .bind(patch)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl Repository for PaymentRepository {
    type Entity = Payment;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError> {
        sqlx::query_as::<_, Payment>(
            "SELECT id, account_id, processor_id, amount, method, status, processor_ref, idempotency_key, metadata, created_at
             FROM payments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

impl TransactionalRepository for PaymentRepository {
    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_db_status() {
        assert_eq!(
            PaymentStatus::from_db_status("pending"),
            Some(PaymentStatus::Pending)
        );
        assert_eq!(
            PaymentStatus::from_db_status("completed"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            PaymentStatus::from_db_status("failed"),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            PaymentStatus::from_db_status("refunded"),
            Some(PaymentStatus::Refunded)
        );
        assert_eq!(PaymentStatus::from_db_status("unknown"), None);
    }

    #[test]
    fn test_status_round_trips() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(
                PaymentStatus::from_db_status(status.to_db_status()),
                Some(status)
            );
        }
    }

    #[test]
    fn test_method_strings() {
        assert_eq!(PaymentMethod::Card.as_str(), "card");
        assert_eq!(PaymentMethod::BankTransfer.as_str(), "bank_transfer");
        assert_eq!(PaymentMethod::Check.as_str(), "check");
        assert_eq!(PaymentMethod::Cash.as_str(), "cash");
    }

    #[test]
    fn test_method_deserializes_from_snake_case() {
        let method: PaymentMethod = serde_json::from_str("\"bank_transfer\"").unwrap();
        assert_eq!(method, PaymentMethod::BankTransfer);
    }
}
