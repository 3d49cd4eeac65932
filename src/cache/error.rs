//! Cache error types

use bb8::RunError;
use redis::RedisError;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(#[from] RedisError),

    #[error("Invalid TTL: {0}")]
    TtlError(String),
}

impl From<RunError<RedisError>> for CacheError {
    fn from(err: RunError<RedisError>) -> Self {
        CacheError::ConnectionError(err.to_string())
    }
}
