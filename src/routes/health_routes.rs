use axum::{extract::State, routing::get, Json, Router};

use crate::error::ApiError;
use crate::models::AppState;

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub data: HealthData,
}

#[derive(serde::Serialize)]
pub struct HealthData {
    pub status: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    // A cheap round trip so the probe also covers the database.
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(HealthResponse {
        data: HealthData {
            status: "ok".to_string(),
        },
    }))
}
