//! Inbound processor webhook verification and handling
//!
//! Events mirror the orchestrator's terminal transitions, driven by
//! asynchronous processor deliveries. Signature verification fails closed;
//! event ids are claimed before handling so a redelivery never reprocesses.

use crate::database::activity_repository::{
    ActivityKind, ActivityRepository, Actor, NewActivity,
};
use crate::database::payment_repository::PaymentRepository;
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};
use crate::payments::idempotency::IdempotencyStore;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Verifies `t=<unix_seconds>,v1=<hex_hmac>` signature headers.
///
/// The HMAC-SHA256 is computed over `"<timestamp>." + body`. Anything
/// malformed, unsigned, or outside the timestamp tolerance is rejected.
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        self.verify_at(payload, signature_header, Utc::now().timestamp())
    }

    fn verify_at(&self, payload: &[u8], signature_header: &str, now: i64) -> bool {
        if signature_header.is_empty() {
            return false;
        }

        let mut timestamp = None;
        let mut signature = None;
        for item in signature_header.split(',') {
            match item.split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signature = Some(value),
                Some(_) => {}
                // An element without '=' makes the whole header malformed
                None => return false,
            }
        }

        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) if !t.is_empty() && !s.is_empty() => (t, s),
            _ => return false,
        };

        let parsed: i64 = match timestamp.parse() {
            Ok(ts) => ts,
            Err(_) => return false,
        };
        if (now - parsed).abs() > self.tolerance_secs {
            return false;
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks
        if expected.len() != signature.len() {
            return false;
        }
        expected
            .as_bytes()
            .iter()
            .zip(signature.as_bytes().iter())
            .fold(0, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Outcome reported to the delivery layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    AlreadyProcessed,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_status(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventType {
    PaymentSucceeded,
    PaymentFailed,
    ChargeRefunded,
    DisputeCreated,
}

impl EventType {
    fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "payment_intent.succeeded" => Some(EventType::PaymentSucceeded),
            "payment_intent.payment_failed" => Some(EventType::PaymentFailed),
            "charge.refunded" => Some(EventType::ChargeRefunded),
            "charge.dispute.created" => Some(EventType::DisputeCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    #[serde(default)]
    object: serde_json::Value,
}

pub struct WebhookProcessor {
    verifier: WebhookVerifier,
    payments: PaymentRepository,
    activities: ActivityRepository,
    events: IdempotencyStore,
}

impl WebhookProcessor {
    pub fn new(
        verifier: WebhookVerifier,
        payments: PaymentRepository,
        activities: ActivityRepository,
        events: IdempotencyStore,
    ) -> Self {
        Self {
            verifier,
            payments,
            activities,
            events,
        }
    }

    /// Receive a raw webhook delivery.
    ///
    /// The event id is claimed before dispatch, so a handler error still
    /// answers success; the sender must not redeliver an event that may
    /// have partially applied.
    pub async fn receive(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> AppResult<WebhookOutcome> {
        if !self.verifier.verify(payload, signature_header) {
            warn!("Webhook rejected: invalid signature");
            return Err(AppError::new(AppErrorKind::External(
                ExternalError::InvalidSignature,
            )));
        }

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|_| {
            AppError::new(AppErrorKind::External(ExternalError::InvalidPayload))
        })?;

        if !self.events.claim_event(&event.id).await? {
            info!("Duplicate webhook event {}, skipping", event.id);
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let kind = match EventType::parse(&event.event_type) {
            Some(kind) => kind,
            None => {
                info!("Unhandled webhook event type {}", event.event_type);
                return Ok(WebhookOutcome::Ignored);
            }
        };

        info!(
            "Processing webhook event {} ({})",
            event.id, event.event_type
        );

        if let Err(e) = self.handle(kind, &event.data.object).await {
            // The event id is already claimed; answering an error would only
            // trigger redelivery of something we cannot safely reprocess
            error!("Error processing webhook event {}: {}", event.id, e);
        }

        Ok(WebhookOutcome::Processed)
    }

    async fn handle(&self, kind: EventType, data: &serde_json::Value) -> AppResult<()> {
        match kind {
            EventType::PaymentSucceeded => self.handle_payment_succeeded(data).await,
            EventType::PaymentFailed => self.handle_payment_failed(data).await,
            EventType::ChargeRefunded => self.handle_charge_refunded(data).await,
            EventType::DisputeCreated => self.handle_dispute_created(data).await,
        }
    }

    async fn handle_payment_succeeded(&self, data: &serde_json::Value) -> AppResult<()> {
        let intent_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("");
        let payment = match self.payments.find_by_processor_ref(intent_id).await? {
            Some(payment) => payment,
            None => {
                warn!("Payment not found for intent {}", intent_id);
                return Ok(());
            }
        };

        if payment.is_completed() {
            return Ok(());
        }

        self.payments
            .confirm_completed(payment.id, &json!({ "webhook_confirmation": data }))
            .await?;
        info!("Payment {} confirmed via webhook", payment.id);
        Ok(())
    }

    async fn handle_payment_failed(&self, data: &serde_json::Value) -> AppResult<()> {
        let intent_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("");
        let payment = match self.payments.find_by_processor_ref(intent_id).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };

        // Only a pending payment moves to failed here; a payment the
        // synchronous path already finalized keeps its state
        if !payment.is_pending() {
            warn!(
                "Ignoring payment_failed for payment {} (status={})",
                payment.id, payment.status
            );
            return Ok(());
        }

        let reason = data
            .get("last_payment_error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown");
        self.payments
            .mark_failed(payment.id, &json!({ "failure_reason": reason }))
            .await?;
        warn!("Payment {} failed: {}", payment.id, reason);
        Ok(())
    }

    async fn handle_charge_refunded(&self, data: &serde_json::Value) -> AppResult<()> {
        let intent_id = data
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let payment = match self.payments.find_by_processor_ref(intent_id).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };

        let already_refunded = payment.is_refunded();
        self.payments
            .mark_refunded(payment.id, &json!({ "refund_webhook": data }))
            .await?;
        info!("Payment {} refunded via webhook", payment.id);

        // Balance restoration is authoritative only through the synchronous
        // refund path. A processor-initiated refund with no matching refund
        // on our side gets flagged for review instead of adjusted here.
        if !already_refunded {
            warn!(
                "Webhook refund for payment {} has no synchronous refund; flagging for review",
                payment.id
            );
            self.activities
                .append(&NewActivity {
                    account_id: payment.account_id,
                    actor: Actor::system(),
                    kind: ActivityKind::Note,
                    description: format!(
                        "Processor-initiated refund received for payment of ${}. Account balance was not adjusted; manual review required.",
                        payment.amount
                    ),
                    metadata: json!({
                        "payment_id": payment.id,
                        "refund_webhook": data,
                    }),
                })
                .await?;
        }
        Ok(())
    }

    async fn handle_dispute_created(&self, data: &serde_json::Value) -> AppResult<()> {
        let intent_id = data
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let payment = match self.payments.find_by_processor_ref(intent_id).await? {
            Some(payment) => payment,
            None => return Ok(()),
        };

        let dispute_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("N/A");
        self.activities
            .append(&NewActivity {
                account_id: payment.account_id,
                actor: Actor::system(),
                kind: ActivityKind::Note,
                description: format!(
                    "Dispute created for payment ${}. Dispute ID: {}",
                    payment.amount, dispute_id
                ),
                metadata: json!({
                    "dispute": data,
                    "payment_id": payment.id,
                }),
            })
            .await?;
        warn!(
            "Dispute created for payment {} on account {}",
            payment.id, payment.account_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, 300)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"id": "evt_1", "type": "payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        let header = sign(SECRET, now, payload);

        assert!(verifier().verify_at(payload, &header, now));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = br#"{"id": "evt_1", "amount": 100}"#;
        let now = Utc::now().timestamp();
        let header = sign(SECRET, now, payload);

        let tampered = br#"{"id": "evt_1", "amount": 999}"#;
        assert!(!verifier().verify_at(tampered, &header, now));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let header = sign("whsec_other", now, payload);

        assert!(!verifier().verify_at(payload, &header, now));
    }

    #[test]
    fn test_expired_timestamp_rejected() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let header = sign(SECRET, now - 301, payload);

        assert!(!verifier().verify_at(payload, &header, now));
        // Timestamps from the future are equally invalid
        let future = sign(SECRET, now + 301, payload);
        assert!(!verifier().verify_at(payload, &future, now));
    }

    #[test]
    fn test_timestamp_inside_tolerance_accepted() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let header = sign(SECRET, now - 299, payload);

        assert!(verifier().verify_at(payload, &header, now));
    }

    #[test]
    fn test_missing_or_malformed_header_rejected() {
        let payload = b"{}";
        let now = Utc::now().timestamp();

        assert!(!verifier().verify_at(payload, "", now));
        assert!(!verifier().verify_at(payload, "t=123", now));
        assert!(!verifier().verify_at(payload, "v1=abcd", now));
        assert!(!verifier().verify_at(payload, "t=notanumber,v1=abcd", now));
        // An element without '=' poisons the whole header
        assert!(!verifier().verify_at(payload, "garbage,t=123,v1=abcd", now));
    }

    #[test]
    fn test_signature_length_mismatch_rejected() {
        let payload = b"{}";
        let now = Utc::now().timestamp();

        let header = format!("t={},v1=abc", now);
        assert!(!verifier().verify_at(payload, &header, now));
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(
            EventType::parse("payment_intent.succeeded"),
            Some(EventType::PaymentSucceeded)
        );
        assert_eq!(
            EventType::parse("payment_intent.payment_failed"),
            Some(EventType::PaymentFailed)
        );
        assert_eq!(
            EventType::parse("charge.refunded"),
            Some(EventType::ChargeRefunded)
        );
        assert_eq!(
            EventType::parse("charge.dispute.created"),
            Some(EventType::DisputeCreated)
        );
        assert_eq!(EventType::parse("customer.created"), None);
    }

    #[test]
    fn test_envelope_parses_stripe_shape() {
        let raw = br#"{
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_456", "status": "succeeded"}}
        }"#;
        let event: WebhookEvent = serde_json::from_slice(raw).unwrap();

        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(
            event.data.object.get("id").and_then(|v| v.as_str()),
            Some("pi_456")
        );
    }

    #[test]
    fn test_envelope_tolerates_missing_fields() {
        let event: WebhookEvent = serde_json::from_slice(b"{}").unwrap();
        assert_eq!(event.id, "");
        assert_eq!(event.event_type, "");
        assert!(event.data.object.is_null());
    }

    #[test]
    fn test_outcome_statuses() {
        assert_eq!(WebhookOutcome::Processed.as_status(), "processed");
        assert_eq!(
            WebhookOutcome::AlreadyProcessed.as_status(),
            "already_processed"
        );
        assert_eq!(WebhookOutcome::Ignored.as_status(), "ignored");
    }
}
