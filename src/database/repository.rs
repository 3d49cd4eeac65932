use crate::database::error::DatabaseError;
use crate::database::transaction::DatabaseTransaction;
use async_trait::async_trait;
use uuid::Uuid;

/// Base repository trait for id-addressed entities.
///
/// Accounts, payments and activities are append-or-update records; nothing in
/// this domain is hard-deleted, so the shared surface is lookup only and the
/// mutation vocabulary lives on each repository.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Send + Sync;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Self::Entity>, DatabaseError>;
}

/// Trait for repositories that take part in multi-statement transactions
#[async_trait]
pub trait TransactionalRepository: Repository {
    /// Get a reference to the connection pool
    fn pool(&self) -> &sqlx::PgPool;

    /// Begin a transaction on this repository's pool
    async fn begin(&self) -> Result<DatabaseTransaction, DatabaseError> {
        DatabaseTransaction::begin(self.pool()).await
    }
}
