use crate::config::WorkerConfig;
use crate::database::activity_repository::Actor;
use crate::database::payment_repository::{Payment, PaymentRepository};
use crate::database::repository::Repository;
use crate::error::AppResult;
use crate::payments::PaymentOrchestrator;
use crate::processor::ProcessorClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const MAX_RETRIES: u32 = 3;

/// What a reconciliation sweep does with a retrieved charge status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileAction {
    Complete,
    Fail,
    TouchOnly,
}

fn reconcile_action(charge_status: &str) -> ReconcileAction {
    match charge_status {
        "succeeded" => ReconcileAction::Complete,
        "canceled" | "requires_payment_method" => ReconcileAction::Fail,
        _ => ReconcileAction::TouchOnly,
    }
}

/// Retry delays: 2s, 4s, 8s (max 3 retries)
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.pow(attempt))
}

/// Background driver for payment processing and reconciliation.
///
/// `process_payment` pushes one pending payment through the processor with
/// bounded retries. The reconciler loop sweeps payments stuck in pending and
/// settles their status against the processor's view. Both paths attribute
/// activities to the system actor.
pub struct PaymentWorker {
    payments: PaymentRepository,
    orchestrator: Arc<PaymentOrchestrator>,
    client: Arc<ProcessorClient>,
    config: WorkerConfig,
}

impl PaymentWorker {
    pub fn new(
        payments: PaymentRepository,
        orchestrator: Arc<PaymentOrchestrator>,
        client: Arc<ProcessorClient>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            payments,
            orchestrator,
            client,
            config,
        }
    }

    /// Process a pending payment with exponential backoff.
    ///
    /// No-ops unless the payment is still pending. Only retryable failures
    /// (breaker open, rate limit, transient processor errors) are retried;
    /// anything else fails permanently after one attempt.
    pub async fn process_payment(&self, payment_id: uuid::Uuid) {
        let payment = match self.payments.find_by_id(payment_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                error!("Payment {} not found", payment_id);
                return;
            }
            Err(e) => {
                error!("Payment {} lookup failed: {}", payment_id, e);
                return;
            }
        };

        if !payment.is_pending() {
            info!(
                "Payment {} already processed (status={})",
                payment_id, payment.status
            );
            return;
        }

        let actor = Actor::system();
        let mut attempt: u32 = 0;
        loop {
            match self.orchestrator.process_pending(payment_id, &actor).await {
                Ok(_) => {
                    info!("Payment {} completed successfully", payment_id);
                    return;
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    warn!(
                        "Payment processor unavailable for payment {}, retrying in {}s: {}",
                        payment_id,
                        delay.as_secs(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Payment {} failed permanently: {}", payment_id, e);
                    return;
                }
            }
        }
    }

    /// Run the reconciliation loop until a shutdown signal arrives
    pub async fn run_reconciler(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Starting payment reconciliation worker...");

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.reconcile_interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_cycle().await {
                        error!("Reconciliation cycle failed: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Payment reconciliation worker received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Payment reconciliation worker stopped");
    }

    /// One sweep over payments stuck in pending longer than the threshold
    async fn reconcile_cycle(&self) -> AppResult<()> {
        let cutoff =
            chrono::Utc::now() - chrono::Duration::seconds(self.config.reconcile_stale_after_secs);
        let stale = self
            .payments
            .find_stale_pending(cutoff, self.config.reconcile_batch_size)
            .await?;

        if stale.is_empty() {
            return Ok(());
        }
        info!(
            "Found {} stale pending payments for reconciliation",
            stale.len()
        );

        for payment in stale {
            if let Err(e) = self.reconcile_single(&payment).await {
                error!("Failed to reconcile payment {}: {}", payment.id, e);
            }
        }
        Ok(())
    }

    /// Settle one payment's status against the processor's view.
    ///
    /// Status-only: balance adjustment belongs to the synchronous payment
    /// and refund paths.
    async fn reconcile_single(&self, payment: &Payment) -> AppResult<()> {
        let processor_ref = match payment.processor_ref.as_deref() {
            Some(processor_ref) => processor_ref,
            None => {
                // Pending with no remote reference: the charge never went
                // out, so there is nothing to look up
                self.payments
                    .mark_failed(
                        payment.id,
                        &json!({ "reconciliation": "No processor reference" }),
                    )
                    .await?;
                return Ok(());
            }
        };

        let charge = match self.client.retrieve(processor_ref).await {
            Ok(charge) => charge,
            Err(e) => {
                warn!(
                    "Processor API error during reconciliation of payment {}: {}",
                    payment.id, e
                );
                return Ok(());
            }
        };

        let patch = json!({ "reconciled": true });
        match reconcile_action(&charge.status) {
            ReconcileAction::Complete => {
                self.payments.confirm_completed(payment.id, &patch).await?;
                info!("Payment {} reconciled to completed", payment.id);
            }
            ReconcileAction::Fail => {
                self.payments.mark_failed(payment.id, &patch).await?;
                info!(
                    "Payment {} reconciled to failed (charge status={})",
                    payment.id, charge.status
                );
            }
            ReconcileAction::TouchOnly => {
                self.payments.merge_metadata(payment.id, &patch).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double() {
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_reconcile_action_mapping() {
        assert_eq!(reconcile_action("succeeded"), ReconcileAction::Complete);
        assert_eq!(reconcile_action("canceled"), ReconcileAction::Fail);
        assert_eq!(
            reconcile_action("requires_payment_method"),
            ReconcileAction::Fail
        );
        assert_eq!(
            reconcile_action("requires_confirmation"),
            ReconcileAction::TouchOnly
        );
        assert_eq!(reconcile_action("processing"), ReconcileAction::TouchOnly);
    }
}
