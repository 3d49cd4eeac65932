//! HTTP surface: thin axum handlers over the payment and account services.
//!
//! Handlers parse input, resolve the acting user from headers, call into the
//! service layer, and let `AppError` map failures to status codes. No
//! business logic lives here.

pub mod accounts;
pub mod health;
pub mod payments;
pub mod webhooks;

use crate::accounts::AccountService;
use crate::cache::RedisPool;
use crate::database::activity_repository::Actor;
use crate::payments::{PaymentOrchestrator, WebhookProcessor};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub accounts: Arc<AccountService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub db_pool: PgPool,
    pub cache_pool: RedisPool,
    pub environment: String,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/payments", post(payments::create_payment))
        .route("/payments/:id/refund", post(payments::refund_payment))
        .route("/accounts/:id/transition", post(accounts::transition))
        .route("/accounts/:id/assign", post(accounts::assign))
        .route("/accounts/:id/notes", post(accounts::add_note))
        .route("/webhooks/processor", post(webhooks::receive))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Resolve the acting user from `X-Actor-Id`/`X-Actor-Name`, falling back to
/// the system actor when neither header is present
pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok());
    let name = headers
        .get("x-actor-name")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (id, name) {
        (Some(id), Some(name)) => Actor::named(id, name),
        (Some(id), None) => Actor::named(id, id.to_string()),
        (None, Some(name)) => Actor {
            id: None,
            name: name.to_string(),
        },
        (None, None) => Actor::system(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_from_full_headers() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert("x-actor-name", HeaderValue::from_static("Dana Collector"));

        let actor = actor_from_headers(&headers);
        assert_eq!(actor.id, Some(id));
        assert_eq!(actor.name, "Dana Collector");
    }

    #[test]
    fn test_actor_defaults_to_system() {
        let actor = actor_from_headers(&HeaderMap::new());
        assert_eq!(actor.id, None);
        assert_eq!(actor.name, "system");
    }

    #[test]
    fn test_actor_id_without_name_uses_id_label() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_str(&id.to_string()).unwrap());

        let actor = actor_from_headers(&headers);
        assert_eq!(actor.id, Some(id));
        assert_eq!(actor.name, id.to_string());
    }

    #[test]
    fn test_unparseable_actor_id_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_static("not-a-uuid"));
        headers.insert("x-actor-name", HeaderValue::from_static("Dana"));

        let actor = actor_from_headers(&headers);
        assert_eq!(actor.id, None);
        assert_eq!(actor.name, "Dana");
    }

    #[test]
    fn test_blank_name_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-name", HeaderValue::from_static("   "));

        let actor = actor_from_headers(&headers);
        assert_eq!(actor.name, "system");
    }
}
