//! Application-wide error types.
//!
//! Errors are grouped into three kinds: domain (business-rule violations,
//! surfaced as client errors), external (payment processor and other remote
//! failures), and infrastructure (database, cache, configuration).

use std::fmt;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror::Error;

use crate::cache::CacheError;
use crate::database::error::DatabaseError;

pub type AppResult<T> = Result<T, AppError>;

/// Business-rule violations. Never retried automatically.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Account '{id}' not found")]
    AccountNotFound { id: String },

    #[error("Payment '{id}' not found")]
    PaymentNotFound { id: String },

    #[error("Processor '{id}' not found or inactive")]
    ProcessorNotFound { id: String },

    #[error("Invalid transition from '{from}' to '{to}'. Valid transitions: {allowed:?}")]
    InvalidTransition {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("Cannot {operation} payment with status '{status}'")]
    InvalidPaymentState { operation: String, status: String },

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Another submission with the same idempotency key won the claim but its
    /// result has not been persisted yet. Callers should retry shortly.
    #[error("A request with idempotency key '{idempotency_key}' is already in flight")]
    DuplicateRequest { idempotency_key: String },
}

/// Failures originating outside the service boundary.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("Payment processor is temporarily unavailable. Please retry later.")]
    ServiceUnavailable { processor: String },

    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("Rate limit exceeded for {service}")]
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook payload")]
    InvalidPayload,
}

/// Infrastructure-level failures.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug)]
pub struct AppError {
    pub kind: AppErrorKind,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self { kind }
    }

    pub fn account_not_found(id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::AccountNotFound {
            id: id.into(),
        }))
    }

    pub fn payment_not_found(id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::PaymentNotFound {
            id: id.into(),
        }))
    }

    pub fn processor_not_found(id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::ProcessorNotFound {
            id: id.into(),
        }))
    }

    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidAmount {
            reason: reason.into(),
        }))
    }

    pub fn invalid_transition(
        from: impl Into<String>,
        to: impl Into<String>,
        allowed: Vec<String>,
    ) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidTransition {
            from: from.into(),
            to: to.into(),
            allowed,
        }))
    }

    pub fn invalid_payment_state(
        operation: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidPaymentState {
            operation: operation.into(),
            status: status.into(),
        }))
    }

    pub fn duplicate_request(idempotency_key: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::DuplicateRequest {
            idempotency_key: idempotency_key.into(),
        }))
    }

    pub fn service_unavailable(processor: impl Into<String>) -> Self {
        Self::new(AppErrorKind::External(ExternalError::ServiceUnavailable {
            processor: processor.into(),
        }))
    }

    pub fn processor_error(
        provider: impl Into<String>,
        message: impl Into<String>,
        is_retryable: bool,
    ) -> Self {
        Self::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: provider.into(),
            message: message.into(),
            is_retryable,
        }))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(DomainError::DuplicateRequest { .. }) => true,
            AppErrorKind::Domain(_) => false,
            AppErrorKind::External(ExternalError::ServiceUnavailable { .. }) => true,
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::RateLimit { .. }) => true,
            AppErrorKind::External(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database(e)) => e.is_retryable(),
            AppErrorKind::Infrastructure(InfrastructureError::Cache(_)) => true,
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Domain(DomainError::AccountNotFound { .. })
            | AppErrorKind::Domain(DomainError::PaymentNotFound { .. })
            | AppErrorKind::Domain(DomainError::ProcessorNotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppErrorKind::Domain(DomainError::DuplicateRequest { .. }) => StatusCode::CONFLICT,
            AppErrorKind::Domain(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(ExternalError::ServiceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppErrorKind::External(ExternalError::RateLimit { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppErrorKind::External(ExternalError::InvalidSignature)
            | AppErrorKind::External(ExternalError::InvalidPayload) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for AppError {}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }
}

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database(
            err,
        )))
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Cache(
            err,
        )))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::account_not_found("abc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::invalid_amount("must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::invalid_payment_state("refund", "pending").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_service_unavailable_is_retryable() {
        let err = AppError::service_unavailable("stripe");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_processor_error_retryability_follows_flag() {
        assert!(AppError::processor_error("stripe", "500", true).is_retryable());
        assert!(!AppError::processor_error("stripe", "card_declined", false).is_retryable());
    }

    #[test]
    fn test_invalid_payment_state_message() {
        let err = AppError::invalid_payment_state("refund", "pending");
        assert_eq!(
            err.to_string(),
            "Cannot refund payment with status 'pending'"
        );
    }
}
