//! Database error classification.
//!
//! Postgres failures are folded into a small set of variants so callers can
//! branch on duplicate keys and retryability without reaching into sqlx.

use thiserror::Error;

pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("Duplicate value violates constraint '{constraint}'")]
    UniqueViolation { constraint: String },

    #[error("Referenced record missing for constraint '{constraint}'")]
    ForeignKeyViolation { constraint: String },

    #[error("Database query failed: {message}")]
    Query { message: String },

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    #[error("Database connection error: {message}")]
    Connection { message: String },

    #[error("Database configuration error: {message}")]
    Configuration { message: String },
}

impl DatabaseError {
    /// Transient failures that may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::PoolExhausted | DatabaseError::Connection { .. }
        )
    }

    /// True for unique and foreign key violations. The payment path relies
    /// on this to detect an idempotency key that lost the insert race.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::UniqueViolation { .. } | DatabaseError::ForeignKeyViolation { .. }
        )
    }

    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseError::Connection {
                message: "Connection pool is closed".to_string(),
            },
            sqlx::Error::Configuration(msg) => DatabaseError::Configuration {
                message: msg.to_string(),
            },
            sqlx::Error::Database(db_err) => {
                // Classify by Postgres error code
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::UniqueViolation { constraint },
                    Some("23503") => DatabaseError::ForeignKeyViolation { constraint },
                    _ => DatabaseError::Query {
                        message: db_err.message().to_string(),
                    },
                }
            }
            sqlx::Error::Io(io_err) => DatabaseError::Connection {
                message: io_err.to_string(),
            },
            other => DatabaseError::Query {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_is_retryable() {
        assert!(DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(DatabaseError::from_sqlx(sqlx::Error::PoolClosed).is_retryable());
    }

    #[test]
    fn test_row_not_found_is_not_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn test_constraint_violation_display() {
        let err = DatabaseError::UniqueViolation {
            constraint: "payments_idempotency_key_key".to_string(),
        };
        assert!(err.is_constraint_violation());
        assert_eq!(
            err.to_string(),
            "Duplicate value violates constraint 'payments_idempotency_key_key'"
        );
    }
}
