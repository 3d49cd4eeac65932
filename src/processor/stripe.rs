//! Stripe payment gateway implementation
//!
//! Speaks Stripe's form-encoded REST API: payment intents for charges,
//! refunds by payment intent, and intent retrieval for reconciliation.

use crate::error::{AppError, AppErrorKind, ExternalError};
use crate::processor::traits::ProcessorGateway;
use crate::processor::types::{ChargeRequest, ChargeResult, RefundResult, RetrievedCharge};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Stripe gateway configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe API secret key
    pub secret_key: String,
    /// Stripe API base URL (defaults to https://api.stripe.com)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed requests
    pub max_retries: u32,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY").map_err(|_| {
            AppError::configuration("STRIPE_SECRET_KEY environment variable is required")
        })?;

        let base_url = std::env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());

        let timeout_secs = std::env::var("STRIPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let max_retries = std::env::var("STRIPE_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        Ok(Self {
            secret_key,
            base_url,
            timeout_secs,
            max_retries,
        })
    }
}

/// Stripe payment gateway
pub struct StripeGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway instance
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Create gateway from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Make an authenticated request to the Stripe API
    async fn make_request<T>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&Vec<(String, String)>>,
        idempotency_key: Option<&str>,
    ) -> Result<T, AppError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", self.config.secret_key));

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        if let Some(form) = form {
            request = request.form(form);
        }

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match request.try_clone() {
                Some(req) => match req.send().await {
                    Ok(response) => {
                        let status = response.status();
                        let response_text = response.text().await.unwrap_or_default();

                        if status.is_success() {
                            return serde_json::from_str::<T>(&response_text).map_err(|e| {
                                error!("Failed to parse Stripe response: {}", e);
                                AppError::new(AppErrorKind::External(
                                    ExternalError::PaymentProvider {
                                        provider: "Stripe".to_string(),
                                        message: format!("Invalid response format: {}", e),
                                        is_retryable: false,
                                    },
                                ))
                            });
                        } else if status == 429 {
                            // Rate limit - retry with backoff
                            if attempt < self.config.max_retries {
                                let backoff = 2_u64.pow(attempt);
                                warn!(
                                    "Rate limited, retrying after {} seconds (attempt {})",
                                    backoff,
                                    attempt + 1
                                );
                                tokio::time::sleep(Duration::from_secs(backoff)).await;
                                continue;
                            }
                            return Err(AppError::new(AppErrorKind::External(
                                ExternalError::RateLimit {
                                    service: "Stripe".to_string(),
                                    retry_after: Some(60),
                                },
                            )));
                        } else if status.is_server_error() && attempt < self.config.max_retries {
                            // Server error - retry
                            let backoff = 2_u64.pow(attempt);
                            warn!(
                                "Server error {}, retrying after {} seconds (attempt {})",
                                status,
                                backoff,
                                attempt + 1
                            );
                            tokio::time::sleep(Duration::from_secs(backoff)).await;
                            continue;
                        } else {
                            let error_msg = serde_json::from_str::<StripeErrorEnvelope>(
                                &response_text,
                            )
                            .ok()
                            .and_then(|envelope| envelope.error.message)
                            .unwrap_or_else(|| format!("HTTP {}: {}", status, response_text));

                            error!("Stripe API error: {}", error_msg);
                            return Err(AppError::new(AppErrorKind::External(
                                ExternalError::PaymentProvider {
                                    provider: "Stripe".to_string(),
                                    message: error_msg,
                                    is_retryable: status.is_server_error(),
                                },
                            )));
                        }
                    }
                    Err(e) => {
                        last_error = Some(e);
                        if attempt < self.config.max_retries {
                            let backoff = 2_u64.pow(attempt);
                            warn!(
                                "Request error, retrying after {} seconds (attempt {}): {}",
                                backoff,
                                attempt + 1,
                                last_error.as_ref().unwrap()
                            );
                            tokio::time::sleep(Duration::from_secs(backoff)).await;
                            continue;
                        }
                    }
                },
                None => {
                    return Err(AppError::new(AppErrorKind::External(
                        ExternalError::PaymentProvider {
                            provider: "Stripe".to_string(),
                            message: "Failed to clone request".to_string(),
                            is_retryable: false,
                        },
                    )));
                }
            }
        }

        Err(AppError::new(AppErrorKind::External(
            ExternalError::PaymentProvider {
                provider: "Stripe".to_string(),
                message: format!(
                    "Request failed after {} retries: {}",
                    self.config.max_retries,
                    last_error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "Unknown error".to_string())
                ),
                is_retryable: true,
            },
        )))
    }
}

#[async_trait]
impl ProcessorGateway for StripeGateway {
    async fn charge(&self, request: &ChargeRequest) -> crate::error::AppResult<ChargeResult> {
        info!(
            "Submitting Stripe charge: amount_minor={} currency={}",
            request.amount_minor, request.currency
        );

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency.clone()),
        ];
        form.extend(metadata_form_pairs(&request.metadata));

        let intent: StripePaymentIntent = self
            .make_request(
                reqwest::Method::POST,
                "/v1/payment_intents",
                Some(&form),
                Some(&request.idempotency_key),
            )
            .await?;

        info!(
            "Stripe charge submitted: external_id={} status={}",
            intent.id, intent.status
        );

        Ok(ChargeResult {
            external_id: intent.id,
            status: intent.status,
            client_secret: intent.client_secret,
        })
    }

    async fn refund(
        &self,
        external_id: &str,
        reason: &str,
    ) -> crate::error::AppResult<RefundResult> {
        info!("Submitting Stripe refund: external_id={}", external_id);

        // Stripe only accepts its enumerated refund reasons; the caller's
        // reason rides along as metadata
        let form: Vec<(String, String)> = vec![
            ("payment_intent".to_string(), external_id.to_string()),
            ("reason".to_string(), "requested_by_customer".to_string()),
            ("metadata[note]".to_string(), reason.to_string()),
        ];

        let refund: StripeRefund = self
            .make_request(reqwest::Method::POST, "/v1/refunds", Some(&form), None)
            .await?;

        info!(
            "Stripe refund submitted: refund_id={} status={}",
            refund.id, refund.status
        );

        Ok(RefundResult {
            external_id: refund.id,
            status: refund.status,
        })
    }

    async fn retrieve(&self, external_id: &str) -> crate::error::AppResult<RetrievedCharge> {
        let intent: StripePaymentIntent = self
            .make_request(
                reqwest::Method::GET,
                &format!("/v1/payment_intents/{}", external_id),
                None,
                None,
            )
            .await?;

        Ok(RetrievedCharge {
            external_id: intent.id,
            status: intent.status,
        })
    }
}

/// Flatten a JSON object into Stripe's `metadata[key]=value` form fields
fn metadata_form_pairs(metadata: &serde_json::Value) -> Vec<(String, String)> {
    match metadata.as_object() {
        Some(map) => map
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (format!("metadata[{}]", key), rendered)
            })
            .collect(),
        None => Vec::new(),
    }
}

// Payment intent response
#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
}

// Refund response
#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
}

// Error envelope
#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stripe_config_default() {
        let config = StripeConfig::default();
        assert_eq!(config.base_url, "https://api.stripe.com");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_stripe_config_from_env_missing_key() {
        std::env::remove_var("STRIPE_SECRET_KEY");

        let config = StripeConfig::from_env();
        assert!(config.is_err(), "Config should fail without secret key");
    }

    #[test]
    fn test_metadata_form_pairs_flattens_strings() {
        let pairs = metadata_form_pairs(&json!({
            "account_id": "abc",
            "payment_id": "def",
        }));
        assert!(pairs.contains(&("metadata[account_id]".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("metadata[payment_id]".to_string(), "def".to_string())));
    }

    #[test]
    fn test_metadata_form_pairs_ignores_non_objects() {
        assert!(metadata_form_pairs(&json!(null)).is_empty());
        assert!(metadata_form_pairs(&json!("flat")).is_empty());
    }

    #[test]
    fn test_error_envelope_parses() {
        let envelope: StripeErrorEnvelope =
            serde_json::from_str(r#"{"error": {"message": "Your card was declined."}}"#).unwrap();
        assert_eq!(
            envelope.error.message.as_deref(),
            Some("Your card was declined.")
        );
    }
}
