use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: String,
    pub cache: String,
}

/// GET /health
///
/// Reports degraded rather than failing the request when a backing store is
/// unreachable, so orchestrators can still read the body.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let database = match crate::database::health_check(&state.db_pool).await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    let cache = match crate::cache::health_check(&state.cache_pool).await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    let status = if database == "up" && cache == "up" {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version,
        environment: state.environment.clone(),
        database: database.to_string(),
        cache: cache.to_string(),
    };

    Ok(Json(response))
}
