//! Breaker-gated processor client
//!
//! Wraps a [`ProcessorGateway`] behind a circuit breaker. Calls are
//! rejected without touching the network while the breaker is open,
//! and every gateway outcome is fed back into the breaker.

use crate::breaker::CircuitBreaker;
use crate::error::{AppError, AppResult};
use crate::processor::traits::ProcessorGateway;
use crate::processor::types::{ChargeRequest, ChargeResult, RefundResult, RetrievedCharge};
use std::sync::Arc;
use tracing::warn;

pub struct ProcessorClient {
    gateway: Arc<dyn ProcessorGateway>,
    breaker: Arc<CircuitBreaker>,
}

impl ProcessorClient {
    pub fn new(gateway: Arc<dyn ProcessorGateway>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { gateway, breaker }
    }

    /// Submit a charge to the processor
    pub async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult> {
        self.guard().await?;

        match self.gateway.charge(request).await {
            Ok(result) => {
                self.breaker.record_success().await;
                Ok(result)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }

    /// Submit a refund for a previously captured charge
    pub async fn refund(&self, external_id: &str, reason: &str) -> AppResult<RefundResult> {
        self.guard().await?;

        match self.gateway.refund(external_id, reason).await {
            Ok(result) => {
                self.breaker.record_success().await;
                Ok(result)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }

    /// Fetch the current state of a charge from the processor
    pub async fn retrieve(&self, external_id: &str) -> AppResult<RetrievedCharge> {
        self.guard().await?;

        match self.gateway.retrieve(external_id).await {
            Ok(result) => {
                self.breaker.record_success().await;
                Ok(result)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }

    async fn guard(&self) -> AppResult<()> {
        if !self.breaker.is_available().await {
            warn!(
                "Circuit breaker '{}' is open, rejecting processor call",
                self.breaker.name()
            );
            return Err(AppError::service_unavailable(self.breaker.name()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::cache::MemoryStore;
    use crate::error::AppErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyGateway {
        calls: AtomicU32,
        fail: bool,
    }

    impl FlakyGateway {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessorGateway for FlakyGateway {
        async fn charge(&self, _request: &ChargeRequest) -> AppResult<ChargeResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::processor_error("Test", "boom", true));
            }
            Ok(ChargeResult {
                external_id: "pi_test".to_string(),
                status: "succeeded".to_string(),
                client_secret: None,
            })
        }

        async fn refund(&self, _external_id: &str, _reason: &str) -> AppResult<RefundResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RefundResult {
                external_id: "re_test".to_string(),
                status: "succeeded".to_string(),
            })
        }

        async fn retrieve(&self, external_id: &str) -> AppResult<RetrievedCharge> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RetrievedCharge {
                external_id: external_id.to_string(),
                status: "succeeded".to_string(),
            })
        }
    }

    fn test_breaker(threshold: u32) -> Arc<CircuitBreaker> {
        let config = BreakerConfig {
            failure_threshold: threshold,
            window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(30),
        };
        Arc::new(CircuitBreaker::new(
            "test-processor",
            Arc::new(MemoryStore::new()),
            config,
        ))
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            amount_minor: 1000,
            currency: "usd".to_string(),
            idempotency_key: "key-1".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let gateway = Arc::new(FlakyGateway::new(true));
        let breaker = test_breaker(3);
        let client = ProcessorClient::new(gateway.clone(), breaker);

        for _ in 0..3 {
            let result = client.charge(&charge_request()).await;
            assert!(result.is_err());
        }

        // Breaker is now open; the fourth attempt never reaches the gateway
        let result = client.charge(&charge_request()).await;
        assert!(matches!(
            result.unwrap_err().kind,
            AppErrorKind::External(crate::error::ExternalError::ServiceUnavailable { .. })
        ));
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_success_keeps_breaker_closed() {
        let gateway = Arc::new(FlakyGateway::new(false));
        let breaker = test_breaker(3);
        let client = ProcessorClient::new(gateway.clone(), breaker.clone());

        for _ in 0..5 {
            let result = client.charge(&charge_request()).await;
            assert!(result.is_ok());
        }

        assert!(breaker.is_available().await);
        assert_eq!(gateway.call_count(), 5);
    }

    #[tokio::test]
    async fn test_retrieve_passes_through() {
        let gateway = Arc::new(FlakyGateway::new(false));
        let client = ProcessorClient::new(gateway.clone(), test_breaker(3));

        let retrieved = client.retrieve("pi_123").await.unwrap();
        assert_eq!(retrieved.external_id, "pi_123");
        assert_eq!(gateway.call_count(), 1);
    }
}
