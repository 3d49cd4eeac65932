//! Circuit breaker for outbound payment processor calls
//!
//! State is shared across processes through Redis so every worker sees the
//! same view of processor health. The half-open state is never stored: it is
//! derived lazily by comparing the open timestamp against the recovery
//! timeout, so no background task is needed to transition out of open.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::cache::{keys, KeyValueStore};

const STATE_OPEN: &str = "open";
const STATE_CLOSED: &str = "closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub window: Duration,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            failure_threshold: env::var("CIRCUIT_FAILURE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            window: env::var("CIRCUIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
            recovery_timeout: env::var("CIRCUIT_RECOVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.recovery_timeout),
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    store: Arc<dyn KeyValueStore>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            store,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current breaker state. A stored "open" older than the recovery
    /// timeout reads as half-open without being rewritten.
    pub async fn state(&self) -> BreakerState {
        let state_key = keys::breaker::StateKey::new(&self.name).to_string();
        let stored = match self.store.get(&state_key).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Circuit breaker '{}' state read failed: {}", self.name, e);
                return BreakerState::Closed;
            }
        };

        if stored.as_deref() != Some(STATE_OPEN) {
            return BreakerState::Closed;
        }

        let opened_key = keys::breaker::OpenedAtKey::new(&self.name).to_string();
        if let Ok(Some(raw)) = self.store.get(&opened_key).await {
            if let Ok(opened_at) = raw.parse::<i64>() {
                let elapsed = Utc::now().timestamp() - opened_at;
                if elapsed >= self.config.recovery_timeout.as_secs() as i64 {
                    return BreakerState::HalfOpen;
                }
            }
        }

        BreakerState::Open
    }

    pub async fn is_available(&self) -> bool {
        self.state().await != BreakerState::Open
    }

    pub async fn record_success(&self) {
        let state_key = keys::breaker::StateKey::new(&self.name).to_string();
        if let Err(e) = self
            .store
            .set(&state_key, STATE_CLOSED, Some(self.config.window * 10))
            .await
        {
            warn!("Circuit breaker '{}' close failed: {}", self.name, e);
        }

        let failures_key = keys::breaker::FailuresKey::new(&self.name).to_string();
        if let Err(e) = self.store.delete(&failures_key).await {
            warn!(
                "Circuit breaker '{}' failure reset failed: {}",
                self.name, e
            );
        }
    }

    pub async fn record_failure(&self) {
        // A failed probe while half-open reopens the breaker immediately and
        // restarts the recovery clock
        if self.state().await == BreakerState::HalfOpen {
            warn!(
                "Circuit breaker '{}' reopened after failed half-open probe",
                self.name
            );
            self.trip().await;
            return;
        }

        let failures_key = keys::breaker::FailuresKey::new(&self.name).to_string();
        let failures = match self.store.increment(&failures_key, self.config.window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    "Circuit breaker '{}' failure count failed: {}",
                    self.name, e
                );
                return;
            }
        };

        if failures >= self.config.failure_threshold as i64 {
            warn!(
                "Circuit breaker '{}' OPENED after {} failures",
                self.name, failures
            );
            self.trip().await;
        }
    }

    async fn trip(&self) {
        // The state key must outlive the recovery window; if it expired
        // first the breaker would read closed and skip the half-open probe
        let ttl = (self.config.recovery_timeout * 10).max(Duration::from_secs(60));

        let state_key = keys::breaker::StateKey::new(&self.name).to_string();
        if let Err(e) = self.store.set(&state_key, STATE_OPEN, Some(ttl)).await {
            warn!("Circuit breaker '{}' open failed: {}", self.name, e);
        }

        let opened_key = keys::breaker::OpenedAtKey::new(&self.name).to_string();
        let now = Utc::now().timestamp().to_string();
        if let Err(e) = self.store.set(&opened_key, &now, Some(ttl)).await {
            warn!(
                "Circuit breaker '{}' opened_at write failed: {}",
                self.name, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    fn breaker(store: Arc<MemoryStore>, config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("stripe", store, config)
    }

    #[test]
    fn test_default_config() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let store = Arc::new(MemoryStore::new());
        let breaker = breaker(store, BreakerConfig::default());

        assert_eq!(breaker.state().await, BreakerState::Closed);
        assert!(breaker.is_available().await);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let store = Arc::new(MemoryStore::new());
        let breaker = breaker(store, BreakerConfig::default());

        for _ in 0..4 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Closed);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(!breaker.is_available().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let store = Arc::new(MemoryStore::new());
        let breaker = breaker(store, BreakerConfig::default());

        for _ in 0..4 {
            breaker.record_failure().await;
        }
        breaker.record_success().await;

        for _ in 0..4 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_failures_outside_window_do_not_accumulate() {
        let store = Arc::new(MemoryStore::new());
        let config = BreakerConfig {
            window: Duration::from_millis(0),
            ..Default::default()
        };
        let breaker = breaker(store, config);

        // Every counter write expires immediately, so the threshold is
        // never reached
        for _ in 0..10 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_timeout() {
        let store = Arc::new(MemoryStore::new());
        let config = BreakerConfig {
            recovery_timeout: Duration::from_secs(0),
            ..Default::default()
        };
        let breaker = breaker(store, config);

        for _ in 0..5 {
            breaker.record_failure().await;
        }

        // Recovery timeout of zero elapses immediately
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);
        assert!(breaker.is_available().await);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let store = Arc::new(MemoryStore::new());
        let config = BreakerConfig {
            recovery_timeout: Duration::from_secs(3600),
            ..Default::default()
        };
        let breaker = breaker(store.clone(), config);

        for _ in 0..5 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        // Backdate the open timestamp past the recovery timeout
        let opened_key = keys::breaker::OpenedAtKey::new("stripe").to_string();
        let stale = (Utc::now().timestamp() - 7200).to_string();
        store.set(&opened_key, &stale, None).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        // The failed probe restarts the recovery clock
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let store = Arc::new(MemoryStore::new());
        let config = BreakerConfig {
            recovery_timeout: Duration::from_secs(0),
            ..Default::default()
        };
        let breaker = breaker(store, config);

        for _ in 0..5 {
            breaker.record_failure().await;
        }
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
        assert!(breaker.is_available().await);
    }
}
