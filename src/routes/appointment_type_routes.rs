// src/routes/appointment_type_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, AppointmentTypeRow, OkResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_types).post(create_type))
        .route("/{type_id}", get(get_type))
        .route("/{type_id}", put(update_type))
        .route("/{type_id}", delete(delete_type))
}

const MIN_DURATION_MINUTES: i32 = 5;
const MAX_DURATION_MINUTES: i32 = 480;
const DEFAULT_COLOR: &str = "#4CAF50";

fn validate_name(name: &str) -> Result<(), ApiError> {
    // Character count, not byte length.
    if !(2..=100).contains(&name.chars().count()) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "name must be between 2 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn validate_duration(duration_minutes: i32) -> Result<(), ApiError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!(
                "duration_minutes must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}"
            ),
        ));
    }
    Ok(())
}

fn validate_color(color: &str) -> Result<(), ApiError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "color must be a hex color like #FF6B6B".into(),
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ApiError> {
    if description.is_some_and(|d| d.chars().count() > 500) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "description must not exceed 500 characters".into(),
        ));
    }
    Ok(())
}

/// Exact-match duplicate check, scoped across active AND inactive types.
async fn name_taken(
    state: &AppState,
    name: &str,
    exclude_id: Option<Uuid>,
) -> Result<bool, ApiError> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM appointment_types
        WHERE name = $1
          AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(name)
    .bind(exclude_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(existing.is_some())
}

/* ============================================================
   GET / (?include_inactive=true)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListTypesQuery {
    pub include_inactive: Option<bool>,
}

pub async fn list_types(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<ListTypesQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentTypeRow>>>, ApiError> {
    let include_inactive = q.include_inactive.unwrap_or(false);

    let rows: Vec<AppointmentTypeRow> = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        SELECT id, name, description, duration_minutes, color, is_active, created_at, updated_at
        FROM appointment_types
        WHERE ($1 OR is_active = true)
        ORDER BY name ASC
        "#,
    )
    .bind(include_inactive)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   GET /{id}
   ============================================================ */

pub async fn get_type(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(type_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentTypeRow>>, ApiError> {
    let row: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        SELECT id, name, description, duration_minutes, color, is_active, created_at, updated_at
        FROM appointment_types
        WHERE id = $1
        "#,
    )
    .bind(type_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Appointment type"))?;

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   POST / (admin)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateTypeRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub color: Option<String>,
}

pub async fn create_type(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTypeRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentTypeRow>>), ApiError> {
    auth.ensure_admin()?;

    let name = req.name.trim().to_string();
    validate_name(&name)?;
    validate_duration(req.duration_minutes)?;
    validate_description(req.description.as_deref())?;
    let color = req.color.unwrap_or_else(|| DEFAULT_COLOR.to_string());
    validate_color(&color)?;

    if name_taken(&state, &name, None).await? {
        return Err(ApiError::Conflict(
            "DUPLICATE_NAME",
            "An appointment type with this name already exists".into(),
        ));
    }

    // is_active is forced true on create; "deletion" only ever flips it off.
    let row: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        INSERT INTO appointment_types (name, description, duration_minutes, color, is_active)
        VALUES ($1, $2, $3, $4, true)
        RETURNING id, name, description, duration_minutes, color, is_active, created_at, updated_at
        "#,
    )
    .bind(&name)
    .bind(req.description.as_deref())
    .bind(req.duration_minutes)
    .bind(&color)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok((StatusCode::CREATED, Json(ApiOk { data: row })))
}

/* ============================================================
   PUT /{id} (admin, partial)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateTypeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_type(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(type_id): Path<Uuid>,
    Json(req): Json<UpdateTypeRequest>,
) -> Result<Json<ApiOk<AppointmentTypeRow>>, ApiError> {
    auth.ensure_admin()?;

    let existing: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        SELECT id, name, description, duration_minutes, color, is_active, created_at, updated_at
        FROM appointment_types
        WHERE id = $1
        "#,
    )
    .bind(type_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Appointment type"))?;

    let name = match req.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => existing.name.clone(),
    };
    validate_name(&name)?;

    // Renaming re-checks the duplicate constraint, excluding this row.
    if name != existing.name && name_taken(&state, &name, Some(type_id)).await? {
        return Err(ApiError::Conflict(
            "DUPLICATE_NAME",
            "An appointment type with this name already exists".into(),
        ));
    }

    let duration_minutes = req.duration_minutes.unwrap_or(existing.duration_minutes);
    validate_duration(duration_minutes)?;

    let description = match req.description {
        Some(d) => Some(d),
        None => existing.description.clone(),
    };
    validate_description(description.as_deref())?;

    let color = req.color.unwrap_or_else(|| existing.color.clone());
    validate_color(&color)?;

    let is_active = req.is_active.unwrap_or(existing.is_active);

    let updated: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        UPDATE appointment_types
        SET name = $2,
            description = $3,
            duration_minutes = $4,
            color = $5,
            is_active = $6,
            updated_at = now()
        WHERE id = $1
        RETURNING id, name, description, duration_minutes, color, is_active, created_at, updated_at
        "#,
    )
    .bind(type_id)
    .bind(&name)
    .bind(description.as_deref())
    .bind(duration_minutes)
    .bind(&color)
    .bind(is_active)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: updated }))
}

/* ============================================================
   DELETE /{id} (admin, soft: is_active = false)
   ============================================================ */

pub async fn delete_type(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(type_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    auth.ensure_admin()?;

    // The row is never removed; existing appointments keep referencing it.
    let updated = sqlx::query(
        r#"
        UPDATE appointment_types
        SET is_active = false, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(type_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Appointment type"));
    }

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(5).is_ok());
        assert!(validate_duration(480).is_ok());
        assert!(validate_duration(4).is_err());
        assert!(validate_duration(481).is_err());
        assert!(validate_duration(0).is_err());
    }

    #[test]
    fn color_shape() {
        assert!(validate_color("#4CAF50").is_ok());
        assert!(validate_color("#ff6b6b").is_ok());
        assert!(validate_color("4CAF50").is_err());
        assert!(validate_color("#4CAF5").is_err());
        assert!(validate_color("#4CAF5G").is_err());
    }

    #[test]
    fn name_length() {
        assert!(validate_name("OK").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
        // Multi-byte characters count once each.
        assert!(validate_name(&"Evaluación".repeat(10)).is_ok());
        assert!(validate_name(&"ñ".repeat(101)).is_err());
    }
}
