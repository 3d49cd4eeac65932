//! Payment processing: orchestration, idempotency, inbound webhooks

pub mod idempotency;
pub mod orchestrator;
pub mod webhooks;

pub use idempotency::{derive_idempotency_key, IdempotencyStore};
pub use orchestrator::{NewPayment, PaymentOrchestrator};
pub use webhooks::{WebhookOutcome, WebhookProcessor, WebhookVerifier};
