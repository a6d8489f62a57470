// src/routes/auth_routes.rs

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{generate_access_token, hash_access_token, hash_password, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkResponse, UserRole, UserRow},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
        // Rotate the access token for the current session; the old token is
        // invalidated immediately.
        .route("/refresh", post(refresh))
        // Admin-only: staff accounts are provisioned, not self-registered.
        .route("/register", post(register))
        .route("/change_password", post(change_password))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

impl From<&UserRow> for UserProfile {
    fn from(u: &UserRow) -> Self {
        UserProfile {
            id: u.id,
            email: u.email.clone(),
            full_name: u.full_name.clone(),
            role: u.role,
        }
    }
}

async fn load_user_by_email(state: &AppState, email: &str) -> Result<Option<UserRow>, ApiError> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, email, password_hash, full_name, role, is_active
        FROM users
        WHERE email = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)
}

/* ============================================================
   POST /login
   ============================================================ */

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginData>>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email and password are required".into(),
        ));
    }

    let user = load_user_by_email(&state, email)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Account is disabled".into(),
        ));
    }

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: crate::models::SessionTokenRow = sqlx::query_as(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, device_name, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.id)
    .bind(&token_hash)
    .bind(req.device_name.as_deref())
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: LoginData {
            access_token,
            expires_at: session.expires_at,
            user: UserProfile::from(&user),
        },
    }))
}

/* ============================================================
   GET /me
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct MeData {
    pub user: UserProfile,
    pub session: SessionInfo,
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeData>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, email, password_hash, full_name, role, is_active
        FROM users
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    let expires_at: DateTime<Utc> = sqlx::query_scalar(
        r#"
        SELECT expires_at
        FROM session_token
        WHERE session_token_id = $1
        "#,
    )
    .bind(auth.session_token_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: MeData {
            user: UserProfile::from(&user),
            session: SessionInfo {
                session_token_id: auth.session_token_id,
                expires_at,
            },
        },
    }))
}

/* ============================================================
   POST /logout
   ============================================================ */

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OkResponse>, ApiError> {
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(OkResponse::ok()))
}

/* ============================================================
   POST /refresh
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct RefreshData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn refresh(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<RefreshData>>, ApiError> {
    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let updated = sqlx::query(
        r#"
        UPDATE session_token
        SET session_token_hash = $2, expires_at = $3, last_seen_at = now()
        WHERE session_token_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(&token_hash)
    .bind(expires_at)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    Ok(Json(ApiOk {
        data: RefreshData {
            access_token,
            expires_at,
        },
    }))
}

/* ============================================================
   POST /register (admin only)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Option<UserRole>,
}

pub async fn register(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiOk<UserProfile>>), ApiError> {
    auth.ensure_admin()?;

    let email = req.email.trim();
    let full_name = req.full_name.trim();
    if email.is_empty() || full_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email and full_name are required".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }

    if load_user_by_email(&state, email).await?.is_some() {
        return Err(ApiError::Conflict(
            "USER_EMAIL_EXISTS",
            "A user with this email already exists".into(),
        ));
    }

    let password_hash =
        hash_password(&req.password).map_err(ApiError::Internal)?;
    let role = req.role.unwrap_or(UserRole::User);

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (email, password_hash, full_name, role, is_active)
        VALUES ($1, $2, $3, $4, true)
        RETURNING id, email, password_hash, full_name, role, is_active
        "#,
    )
    .bind(email)
    .bind(&password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: UserProfile::from(&user),
        }),
    ))
}

/* ============================================================
   POST /change_password
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    if req.new_password.len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "new password must be at least 8 characters".into(),
        ));
    }

    let current_hash: String = sqlx::query_scalar(
        r#"
        SELECT password_hash
        FROM users
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    if !verify_password(&req.current_password, &current_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let new_hash = hash_password(&req.new_password).map_err(ApiError::Internal)?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(&new_hash)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(OkResponse::ok()))
}
