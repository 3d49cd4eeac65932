use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::accounts::AccountStatus;
use crate::api::{actor_from_headers, AppState};
use crate::database::account_repository::Account;
use crate::database::activity_repository::Activity;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub new_status: AccountStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /accounts/:id/transition
pub async fn transition(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<Account>, AppError> {
    let actor = actor_from_headers(&headers);
    let account = state
        .accounts
        .transition(id, body.new_status, &actor, body.note.as_deref())
        .await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub collector_id: Uuid,
    #[serde(default)]
    pub collector_name: Option<String>,
}

/// POST /accounts/:id/assign
pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Account>, AppError> {
    let actor = actor_from_headers(&headers);
    let account = state
        .accounts
        .assign(id, body.collector_id, body.collector_name.as_deref(), &actor)
        .await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub text: String,
}

/// POST /accounts/:id/notes
pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<NoteRequest>,
) -> Result<(StatusCode, Json<Activity>), AppError> {
    let actor = actor_from_headers(&headers);
    let activity = state.accounts.add_note(id, &body.text, &actor).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}
