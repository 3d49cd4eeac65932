use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::AppError;

/// POST /webhooks/processor
///
/// The raw body must reach the verifier untouched; parsing happens only
/// after the signature checks out.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .or_else(|| headers.get("x-signature"))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let outcome = state.webhooks.receive(&body, signature).await?;
    Ok(Json(json!({ "status": outcome.as_status() })))
}
