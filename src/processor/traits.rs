use crate::error::AppResult;
use crate::processor::types::{ChargeRequest, ChargeResult, RefundResult, RetrievedCharge};
use async_trait::async_trait;

/// Outbound payment processor operations.
///
/// Implementations speak to one remote processor; circuit breaking and
/// availability gating sit above this trait in `ProcessorClient`.
#[async_trait]
pub trait ProcessorGateway: Send + Sync {
    /// Submit a charge. The idempotency key is forwarded so network-layer
    /// replays are deduplicated remotely as well.
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult>;

    /// Refund a previously completed charge by its external reference
    async fn refund(&self, external_id: &str, reason: &str) -> AppResult<RefundResult>;

    /// Fetch the current state of a charge, for reconciliation
    async fn retrieve(&self, external_id: &str) -> AppResult<RetrievedCharge>;
}
