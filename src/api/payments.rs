use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{actor_from_headers, AppState};
use crate::database::payment_repository::{Payment, PaymentMethod};
use crate::error::AppError;
use crate::payments::NewPayment;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub account_id: Uuid,
    pub processor_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// POST /payments
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let actor = actor_from_headers(&headers);
    let payment = state
        .orchestrator
        .create_payment(
            NewPayment {
                account_id: body.account_id,
                processor_id: body.processor_id,
                amount: body.amount,
                method: body.method,
                idempotency_key: body.idempotency_key,
            },
            &actor,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /payments/:id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<RefundRequest>,
) -> Result<Json<Payment>, AppError> {
    let actor = actor_from_headers(&headers);
    let payment = state
        .orchestrator
        .refund_payment(id, body.reason.as_deref(), &actor)
        .await?;
    Ok(Json(payment))
}
