//! Payment orchestration
//!
//! Turns a payment intent into a definitive completed/failed outcome and
//! keeps Account balance and the Activity timeline consistent with the
//! persisted Payment state. Idempotency keys are claimed in the shared
//! store before any processor call so at most one charge happens per key.

use crate::database::account_repository::AccountRepository;
use crate::database::activity_repository::{
    ActivityKind, ActivityRepository, Actor, NewActivity,
};
use crate::database::payment_repository::{
    NewPaymentRecord, Payment, PaymentMethod, PaymentRepository,
};
use crate::database::processor_repository::ProcessorRepository;
use crate::database::repository::{Repository, TransactionalRepository};
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};
use crate::payments::idempotency::{derive_idempotency_key, IdempotencyStore};
use crate::processor::{to_minor_units, ChargeRequest, ProcessorClient};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const CURRENCY: &str = "usd";

/// A payment submission. The idempotency key is derived from caller
/// context when not supplied.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub account_id: Uuid,
    pub processor_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

pub struct PaymentOrchestrator {
    payments: PaymentRepository,
    accounts: AccountRepository,
    activities: ActivityRepository,
    processors: ProcessorRepository,
    client: Arc<ProcessorClient>,
    idempotency: IdempotencyStore,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: PaymentRepository,
        accounts: AccountRepository,
        activities: ActivityRepository,
        processors: ProcessorRepository,
        client: Arc<ProcessorClient>,
        idempotency: IdempotencyStore,
    ) -> Self {
        Self {
            payments,
            accounts,
            activities,
            processors,
            client,
            idempotency,
        }
    }

    /// Create and process a payment.
    ///
    /// A repeated submission with the same idempotency key returns the
    /// existing Payment without a second processor call. If the winning
    /// submission has not persisted its row yet, the caller gets a
    /// retryable `DuplicateRequest` instead of a second charge.
    pub async fn create_payment(&self, request: NewPayment, actor: &Actor) -> AppResult<Payment> {
        // Rejects non-positive and sub-cent amounts before anything persists
        let amount_minor = to_minor_units(request.amount)?;

        let processor = self
            .processors
            .find_active(request.processor_id)
            .await?
            .ok_or_else(|| AppError::processor_not_found(request.processor_id.to_string()))?;

        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| derive_idempotency_key(request.account_id, request.amount));

        // Fast path: a prior submission already holds this key
        if self.idempotency.payment_key_seen(&key).await? {
            return self.existing_payment(&key).await;
        }

        // Claim before calling out; losing the race here is the same as
        // having found a prior claim above
        if !self.idempotency.claim_payment_key(&key).await? {
            return self.existing_payment(&key).await;
        }

        let record = NewPaymentRecord {
            account_id: request.account_id,
            processor_id: request.processor_id,
            amount: request.amount,
            method: request.method,
            idempotency_key: key.clone(),
        };
        let payment = match self.payments.insert_pending(&record).await {
            Ok(payment) => payment,
            Err(e) if e.is_constraint_violation() => {
                // The store lost the claim but the unique key caught the
                // duplicate; fall back to the persisted row
                return self.existing_payment(&key).await;
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Payment {} created pending via processor '{}' (amount={})",
            payment.id, processor.slug, payment.amount
        );

        self.charge_and_finalize(&payment, amount_minor, actor).await
    }

    /// Drive an existing pending payment through the processor.
    ///
    /// Used by background retry. The processor-side idempotency key is
    /// passed through unchanged, so repeating the charge is safe.
    pub async fn process_pending(&self, payment_id: Uuid, actor: &Actor) -> AppResult<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(payment_id.to_string()))?;

        if !payment.is_pending() {
            return Ok(payment);
        }

        self.processors
            .find_active(payment.processor_id)
            .await?
            .ok_or_else(|| AppError::processor_not_found(payment.processor_id.to_string()))?;

        let amount_minor = to_minor_units(payment.amount)?;
        self.charge_and_finalize(&payment, amount_minor, actor).await
    }

    /// Refund a completed payment and restore the account balance.
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: Option<&str>,
        actor: &Actor,
    ) -> AppResult<Payment> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(payment_id.to_string()))?;

        if !payment.is_completed() {
            return Err(AppError::invalid_payment_state("refund", &payment.status));
        }
        let processor_ref = match payment.processor_ref.as_deref() {
            Some(processor_ref) => processor_ref.to_string(),
            None => {
                return Err(AppError::invalid_payment_state(
                    "refund",
                    "completed (no processor reference)",
                ));
            }
        };

        let reason = reason
            .filter(|r| !r.is_empty())
            .unwrap_or("Requested by agency admin");

        let result = self.client.refund(&processor_ref, reason).await?;

        let mut tx = self.payments.begin().await?;

        // Lock order is payment then account, same as completion
        let current = self
            .payments
            .find_by_id_for_update(tx.tx_mut(), payment.id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(payment.id.to_string()))?;
        if !current.is_completed() {
            tx.rollback().await?;
            return Err(AppError::invalid_payment_state("refund", &current.status));
        }

        let refunded = self
            .payments
            .mark_refunded_tx(
                tx.tx_mut(),
                payment.id,
                &json!({ "refund": result.to_metadata() }),
            )
            .await?;

        let account = self
            .accounts
            .find_by_id_for_update(tx.tx_mut(), payment.account_id)
            .await?
            .ok_or_else(|| AppError::account_not_found(payment.account_id.to_string()))?;

        let new_balance = account.current_balance + payment.amount;
        self.accounts
            .update_balance_tx(tx.tx_mut(), account.id, new_balance)
            .await?;

        self.activities
            .append_tx(
                tx.tx_mut(),
                &NewActivity {
                    account_id: account.id,
                    actor: actor.clone(),
                    kind: ActivityKind::Payment,
                    description: format!(
                        "Refund of ${} processed. Reason: {}",
                        payment.amount, reason
                    ),
                    metadata: json!({
                        "payment_id": payment.id,
                        "refund_id": result.external_id,
                    }),
                },
            )
            .await?;

        tx.commit().await?;

        info!(
            "Payment {} refunded (refund_id={}), account {} balance restored to {}",
            payment.id, result.external_id, account.id, new_balance
        );

        Ok(refunded)
    }

    /// Charge the processor and finalize the payment. Failure marks the
    /// payment failed and propagates; the account balance is untouched.
    async fn charge_and_finalize(
        &self,
        payment: &Payment,
        amount_minor: i64,
        actor: &Actor,
    ) -> AppResult<Payment> {
        let charge = ChargeRequest {
            amount_minor,
            currency: CURRENCY.to_string(),
            idempotency_key: payment.idempotency_key.clone(),
            metadata: json!({
                "account_id": payment.account_id,
                "payment_id": payment.id,
            }),
        };

        let result = match self.client.charge(&charge).await {
            Ok(result) => result,
            Err(e) => {
                let description = match &e.kind {
                    AppErrorKind::External(ExternalError::ServiceUnavailable { .. }) => {
                        "Payment processor unavailable".to_string()
                    }
                    _ => e.to_string(),
                };
                self.payments
                    .mark_failed(payment.id, &json!({ "error": description }))
                    .await?;
                warn!("Payment {} failed: {}", payment.id, e);
                return Err(e);
            }
        };

        // Success path: payment, balance, and activity commit together
        let mut tx = self.payments.begin().await?;

        let current = self
            .payments
            .find_by_id_for_update(tx.tx_mut(), payment.id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(payment.id.to_string()))?;
        if !current.is_pending() {
            // A webhook or reconciliation sweep finalized it first
            tx.rollback().await?;
            info!(
                "Payment {} already finalized (status={}), skipping balance update",
                current.id, current.status
            );
            return Ok(current);
        }

        let completed = self
            .payments
            .mark_completed_tx(
                tx.tx_mut(),
                payment.id,
                &result.external_id,
                &result.to_metadata(),
            )
            .await?;

        let account = self
            .accounts
            .find_by_id_for_update(tx.tx_mut(), payment.account_id)
            .await?
            .ok_or_else(|| AppError::account_not_found(payment.account_id.to_string()))?;

        let new_balance = (account.current_balance - payment.amount).max(Decimal::ZERO);
        self.accounts
            .update_balance_tx(tx.tx_mut(), account.id, new_balance)
            .await?;

        self.activities
            .append_tx(
                tx.tx_mut(),
                &NewActivity {
                    account_id: account.id,
                    actor: actor.clone(),
                    kind: ActivityKind::Payment,
                    description: format!(
                        "Payment of ${} received via {}",
                        payment.amount, payment.method
                    ),
                    metadata: json!({
                        "payment_id": payment.id,
                        "processor_ref": result.external_id,
                    }),
                },
            )
            .await?;

        tx.commit().await?;

        info!(
            "Payment {} completed (processor_ref={}), account {} balance now {}",
            payment.id, result.external_id, account.id, new_balance
        );

        Ok(completed)
    }

    /// Resolve the persisted payment for an already-claimed idempotency key
    async fn existing_payment(&self, key: &str) -> AppResult<Payment> {
        match self.payments.find_by_idempotency_key(key).await? {
            Some(existing) => {
                info!(
                    "Duplicate submission for idempotency key, returning payment {}",
                    existing.id
                );
                Ok(existing)
            }
            // The winner's write has not landed yet; retry shortly
            None => Err(AppError::duplicate_request(key)),
        }
    }
}
