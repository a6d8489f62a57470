// src/routes/user_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, UserRole},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserPublicRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{user_id}", get(get_user).patch(update_user))
        .route("/{user_id}/disable", post(disable_user))
        .route("/{user_id}/enable", post(enable_user))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<UserPublicRow>>>, ApiError> {
    auth.ensure_admin()?;

    let users: Vec<UserPublicRow> = sqlx::query_as::<_, UserPublicRow>(
        r#"
        SELECT id, email, full_name, role, is_active, created_at
        FROM users
        WHERE deleted_at IS NULL
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: users }))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    auth.ensure_admin()?;

    let user: UserPublicRow = sqlx::query_as::<_, UserPublicRow>(
        r#"
        SELECT id, email, full_name, role, is_active, created_at
        FROM users
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(ApiOk { data: user }))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    auth.ensure_admin()?;

    let updated: UserPublicRow = sqlx::query_as::<_, UserPublicRow>(
        r#"
        UPDATE users
        SET full_name = COALESCE($2, full_name),
            role = COALESCE($3, role),
            is_active = COALESCE($4, is_active),
            updated_at = now()
        WHERE id = $1
          AND deleted_at IS NULL
        RETURNING id, email, full_name, role, is_active, created_at
        "#,
    )
    .bind(user_id)
    .bind(req.full_name.as_deref().map(str::trim))
    .bind(req.role)
    .bind(req.is_active)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(ApiOk { data: updated }))
}

async fn set_active(
    state: &AppState,
    user_id: Uuid,
    active: bool,
) -> Result<UserPublicRow, ApiError> {
    sqlx::query_as::<_, UserPublicRow>(
        r#"
        UPDATE users
        SET is_active = $2, updated_at = now()
        WHERE id = $1
          AND deleted_at IS NULL
        RETURNING id, email, full_name, role, is_active, created_at
        "#,
    )
    .bind(user_id)
    .bind(active)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("User"))
}

pub async fn disable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    auth.ensure_admin()?;

    // Admins cannot lock themselves out.
    if user_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "You cannot disable your own account".into(),
        ));
    }

    let user = set_active(&state, user_id, false).await?;
    Ok(Json(ApiOk { data: user }))
}

pub async fn enable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    auth.ensure_admin()?;

    let user = set_active(&state, user_id, true).await?;
    Ok(Json(ApiOk { data: user }))
}
