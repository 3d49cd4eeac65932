//! Idempotency and event-dedup claims over the shared key-value store
//!
//! Claims are markers with a 24h TTL. Losing a claim means another caller
//! already holds the key; the winner's persisted result is authoritative.
//! Loss of the store risks at-most-duplicate processing, never data loss.

use crate::cache::keys;
use crate::cache::{CacheResult, KeyValueStore};
use chrono::Utc;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CLAIM_TTL: Duration = Duration::from_secs(86_400);

#[derive(Clone)]
pub struct IdempotencyStore {
    store: Arc<dyn KeyValueStore>,
}

impl IdempotencyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Whether a payment idempotency key has already been claimed
    pub async fn payment_key_seen(&self, key: &str) -> CacheResult<bool> {
        self.store
            .exists(&keys::payments::IdempotencyKey::new(key).to_string())
            .await
    }

    /// Atomically claim a payment idempotency key. Returns false when
    /// another caller holds the claim.
    pub async fn claim_payment_key(&self, key: &str) -> CacheResult<bool> {
        self.store
            .set_if_absent(
                &keys::payments::IdempotencyKey::new(key).to_string(),
                "1",
                CLAIM_TTL,
            )
            .await
    }

    /// Atomically claim an inbound webhook event id. Returns false for a
    /// duplicate delivery.
    pub async fn claim_event(&self, event_id: &str) -> CacheResult<bool> {
        self.store
            .set_if_absent(
                &keys::webhooks::EventKey::new(event_id).to_string(),
                "1",
                CLAIM_TTL,
            )
            .await
    }
}

/// Derive an idempotency key from caller context when none is supplied
pub fn derive_idempotency_key(account_id: Uuid, amount: Decimal) -> String {
    let raw = format!("{}:{}:{}", account_id, amount, Utc::now().timestamp());
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = IdempotencyStore::new(Arc::new(MemoryStore::new()));

        assert!(store.claim_payment_key("key-a").await.unwrap());
        assert!(!store.claim_payment_key("key-a").await.unwrap());
        assert!(store.payment_key_seen("key-a").await.unwrap());
        assert!(!store.payment_key_seen("key-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_event_claims_are_independent_of_payment_claims() {
        let store = IdempotencyStore::new(Arc::new(MemoryStore::new()));

        assert!(store.claim_event("evt_1").await.unwrap());
        assert!(!store.claim_event("evt_1").await.unwrap());
        // Same token under the payment namespace is still free
        assert!(store.claim_payment_key("evt_1").await.unwrap());
    }

    #[test]
    fn test_derived_key_is_hex_sha256() {
        let key = derive_idempotency_key(Uuid::new_v4(), dec!(150.00));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derived_keys_differ_per_account() {
        let amount = dec!(25.00);
        let a = derive_idempotency_key(Uuid::new_v4(), amount);
        let b = derive_idempotency_key(Uuid::new_v4(), amount);
        assert_ne!(a, b);
    }
}
