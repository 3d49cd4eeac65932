use crate::database::error::DatabaseError;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error as log_error};

/// Wrapper around a sqlx transaction.
///
/// Payment completion, refunds, and import rows each write several tables
/// that must land together; repositories expose `_tx` variants that run
/// against the handle returned by [`tx_mut`](Self::tx_mut).
pub struct DatabaseTransaction {
    transaction: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    pub async fn begin(pool: &PgPool) -> Result<Self, DatabaseError> {
        debug!("Beginning database transaction");

        let transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        match self.transaction.take() {
            Some(tx) => tx.commit().await.map_err(|e| {
                log_error!("Failed to commit transaction: {}", e);
                DatabaseError::from_sqlx(e)
            }),
            None => Err(DatabaseError::Transaction {
                message: "Transaction already completed".to_string(),
            }),
        }
    }

    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        match self.transaction.take() {
            Some(tx) => tx.rollback().await.map_err(|e| {
                log_error!("Failed to rollback transaction: {}", e);
                DatabaseError::from_sqlx(e)
            }),
            None => Err(DatabaseError::Transaction {
                message: "Transaction already completed".to_string(),
            }),
        }
    }

    /// Handle for executing queries inside the transaction
    pub fn tx_mut(&mut self) -> &mut SqlxTransaction<'static, Postgres> {
        self.transaction
            .as_mut()
            .expect("Transaction was already completed")
    }
}

impl Drop for DatabaseTransaction {
    fn drop(&mut self) {
        // An un-committed sqlx transaction rolls back on drop; log so
        // abandoned transactions are visible
        if self.transaction.is_some() {
            debug!("Dropping uncommitted transaction, rolling back");
        }
    }
}
