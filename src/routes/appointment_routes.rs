// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentDetail, AppointmentRow, AppointmentStatus,
        AppointmentTypeBrief, AppointmentTypeRow, ClientBrief, OkResponse, Pagination, UserBrief,
    },
    schedule::{self, BookedSlot},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_appointments))
        .route("/", post(create_appointment))
        .route("/{appointment_id}", get(get_appointment))
        .route("/{appointment_id}", put(update_appointment))
        .route("/{appointment_id}/status", patch(update_appointment_status))
        .route("/{appointment_id}", delete(delete_appointment))
}

const MAX_NOTES_LEN: usize = 1000;

/* ============================================================
   Validation helpers
   ============================================================ */

/// Input shape check for `HH:MM[:SS]`. The interval kernel itself is
/// permissive about stored values; new input is held to the strict shape.
fn validate_start_time(value: &str) -> Result<(), ApiError> {
    let parts: Vec<&str> = value.split(':').collect();
    let well_formed = matches!(parts.len(), 2 | 3)
        && parts[0].parse::<u32>().is_ok_and(|h| h <= 23)
        && parts[1].len() == 2
        && parts[1].parse::<u32>().is_ok_and(|m| m <= 59)
        && (parts.len() == 2
            || (parts[2].len() == 2 && parts[2].parse::<u32>().is_ok_and(|s| s <= 59)));

    if well_formed {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "start_time must be in format HH:MM or HH:MM:SS".into(),
        ))
    }
}

fn is_past_date(date: NaiveDate, today: NaiveDate) -> bool {
    date < today
}

fn ensure_future_date(date: NaiveDate) -> Result<(), ApiError> {
    // Day granularity on the naive local clock; same-day bookings are fine.
    if is_past_date(date, chrono::Local::now().date_naive()) {
        return Err(ApiError::BadRequest(
            "DATE_IN_PAST",
            "Appointment date cannot be in the past".into(),
        ));
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>) -> Result<(), ApiError> {
    if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("notes must not exceed {MAX_NOTES_LEN} characters"),
        ));
    }
    Ok(())
}

/* ============================================================
   Joined detail projection
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct AppointmentDetailRow {
    id: Uuid,
    appointment_date: NaiveDate,
    start_time: String,
    end_time: Option<String>,
    status: AppointmentStatus,
    notes: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    client_id: Uuid,
    client_first_name: String,
    client_last_name: String,
    client_email: String,
    client_phone: String,
    type_id: Uuid,
    type_name: String,
    type_duration_minutes: i32,
    type_color: String,
    creator_id: Uuid,
    creator_full_name: String,
    creator_email: String,
}

impl From<AppointmentDetailRow> for AppointmentDetail {
    fn from(r: AppointmentDetailRow) -> Self {
        AppointmentDetail {
            id: r.id,
            appointment_date: r.appointment_date,
            start_time: r.start_time,
            end_time: r.end_time,
            status: r.status,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
            client: ClientBrief {
                id: r.client_id,
                first_name: r.client_first_name,
                last_name: r.client_last_name,
                email: r.client_email,
                phone: r.client_phone,
            },
            appointment_type: AppointmentTypeBrief {
                id: r.type_id,
                name: r.type_name,
                duration_minutes: r.type_duration_minutes,
                color: r.type_color,
            },
            creator: UserBrief {
                id: r.creator_id,
                full_name: r.creator_full_name,
                email: r.creator_email,
            },
        }
    }
}

const DETAIL_COLUMNS: &str = r#"
    a.id,
    a.appointment_date,
    a.start_time,
    a.end_time,
    a.status,
    a.notes,
    a.created_at,
    a.updated_at,

    c.id AS client_id,
    c.first_name AS client_first_name,
    c.last_name AS client_last_name,
    c.email AS client_email,
    c.phone AS client_phone,

    t.id AS type_id,
    t.name AS type_name,
    t.duration_minutes AS type_duration_minutes,
    t.color AS type_color,

    u.id AS creator_id,
    u.full_name AS creator_full_name,
    u.email AS creator_email
"#;

/// Reload an appointment joined with client, type, and creator projections.
/// Related rows are joined regardless of their own soft-delete state; the
/// appointment still references them.
async fn fetch_detail(state: &AppState, appointment_id: Uuid) -> Result<AppointmentDetail, ApiError> {
    let sql = format!(
        r#"
        SELECT {DETAIL_COLUMNS}
        FROM appointments a
        JOIN clients c ON c.id = a.client_id
        JOIN appointment_types t ON t.id = a.appointment_type_id
        JOIN users u ON u.id = a.created_by
        WHERE a.id = $1
          AND a.deleted_at IS NULL
        "#
    );

    let row: AppointmentDetailRow = sqlx::query_as::<_, AppointmentDetailRow>(&sql)
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;

    Ok(row.into())
}

/* ============================================================
   Overlap scan
   ============================================================ */

/// Fetch the booked slots considered by the conflict check: same client,
/// same date, not soft-deleted, each joined to its type's duration. Status
/// filtering and self-exclusion happen in the kernel. Runs inside the
/// caller's transaction so the scan sits under the client row lock.
async fn load_booked_slots(
    tx: &mut sqlx::PgConnection,
    client_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<BookedSlot>, ApiError> {
    sqlx::query_as::<_, BookedSlot>(
        r#"
        SELECT
          a.id AS appointment_id,
          a.start_time,
          a.status,
          t.duration_minutes
        FROM appointments a
        JOIN appointment_types t ON t.id = a.appointment_type_id
        WHERE a.client_id = $1
          AND a.appointment_date = $2
          AND a.deleted_at IS NULL
        "#,
    )
    .bind(client_id)
    .bind(date)
    .fetch_all(tx)
    .await
    .map_err(ApiError::db)
}

fn ensure_no_overlap(
    candidate: (i32, i32),
    exclude_id: Option<Uuid>,
    booked: &[BookedSlot],
) -> Result<(), ApiError> {
    if let Some(existing) = schedule::find_conflict(candidate, exclude_id, booked) {
        return Err(ApiError::Overlap {
            existing_appointment_id: existing.appointment_id,
            start_time: existing.start_time.clone(),
        });
    }
    Ok(())
}

/// Lock the client's row so concurrent bookings for the same client
/// serialize; the overlap scan and the write happen under this lock.
/// Returns the client's deleted_at so callers can reject soft-deleted
/// clients where that matters.
async fn lock_client_row(
    tx: &mut sqlx::PgConnection,
    client_id: Uuid,
) -> Result<Option<Option<chrono::DateTime<chrono::Utc>>>, ApiError> {
    sqlx::query_scalar::<_, Option<chrono::DateTime<chrono::Utc>>>(
        r#"
        SELECT deleted_at
        FROM clients
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(client_id)
    .fetch_optional(tx)
    .await
    .map_err(ApiError::db)
}

/* ============================================================
   GET / (list with filters + pagination)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentListData {
    pub appointments: Vec<AppointmentDetail>,
    pub pagination: Pagination,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<AppointmentListData>>, ApiError> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "limit must be between 1 and 100".into(),
        ));
    }
    let offset = (page - 1) * limit;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointments a
        WHERE a.deleted_at IS NULL
          AND ($1::date IS NULL OR a.appointment_date = $1)
          AND ($2::appointment_status IS NULL OR a.status = $2)
          AND ($3::uuid IS NULL OR a.client_id = $3)
        "#,
    )
    .bind(q.date)
    .bind(q.status)
    .bind(q.client_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let sql = format!(
        r#"
        SELECT {DETAIL_COLUMNS}
        FROM appointments a
        JOIN clients c ON c.id = a.client_id
        JOIN appointment_types t ON t.id = a.appointment_type_id
        JOIN users u ON u.id = a.created_by
        WHERE a.deleted_at IS NULL
          AND ($1::date IS NULL OR a.appointment_date = $1)
          AND ($2::appointment_status IS NULL OR a.status = $2)
          AND ($3::uuid IS NULL OR a.client_id = $3)
        ORDER BY a.appointment_date ASC, a.start_time ASC
        LIMIT $4 OFFSET $5
        "#
    );

    let rows: Vec<AppointmentDetailRow> = sqlx::query_as::<_, AppointmentDetailRow>(&sql)
        .bind(q.date)
        .bind(q.status)
        .bind(q.client_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: AppointmentListData {
            appointments: rows.into_iter().map(Into::into).collect(),
            pagination: Pagination::new(total, page, limit),
        },
    }))
}

/* ============================================================
   GET /{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDetail>>, ApiError> {
    let detail = fetch_detail(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   POST / (create)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub client_id: Uuid,
    pub appointment_type_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDetail>>), ApiError> {
    validate_start_time(&req.start_time)?;
    validate_notes(req.notes.as_deref())?;

    // Persisted times are zero-padded so text collation orders them
    // temporally; the edge check accepts single-digit hours ("9:30").
    let start_time = schedule::normalize_time(&req.start_time);

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // 1) client must exist (lock serializes concurrent bookings per client)
    match lock_client_row(&mut *tx, req.client_id).await? {
        Some(None) => {}
        Some(Some(_)) | None => return Err(ApiError::not_found("Client")),
    }

    // 2) appointment type must exist and be active
    let appointment_type: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        SELECT id, name, description, duration_minutes, color, is_active, created_at, updated_at
        FROM appointment_types
        WHERE id = $1
        "#,
    )
    .bind(req.appointment_type_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Appointment type"))?;

    if !appointment_type.is_active {
        return Err(ApiError::BadRequest(
            "TYPE_INACTIVE",
            "This appointment type is not active".into(),
        ));
    }

    // 3) no past-dated bookings
    ensure_future_date(req.appointment_date)?;

    // 4) overlap scan under the client lock
    let candidate = schedule::interval(&start_time, appointment_type.duration_minutes);
    let booked = load_booked_slots(&mut *tx, req.client_id, req.appointment_date).await?;
    ensure_no_overlap(candidate, None, &booked)?;

    // 5) persist; status is forced to pending regardless of input
    let end_time = schedule::format_minutes(candidate.1);
    let appointment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO appointments
            (client_id, appointment_type_id, appointment_date, start_time, end_time, status, notes, created_by)
        VALUES
            ($1, $2, $3, $4, $5, 'pending', $6, $7)
        RETURNING id
        "#,
    )
    .bind(req.client_id)
    .bind(req.appointment_type_id)
    .bind(req.appointment_date)
    .bind(&start_time)
    .bind(&end_time)
    .bind(req.notes.as_deref())
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let detail = fetch_detail(&state, appointment_id).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: detail })))
}

/* ============================================================
   PUT /{id} (partial update, re-validated)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub client_id: Option<Uuid>,
    pub appointment_type_id: Option<Uuid>,
    pub appointment_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "crate::models::deserialize_double_option")]
    pub notes: Option<Option<String>>,
}

pub async fn update_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDetail>>, ApiError> {
    if let Some(start_time) = req.start_time.as_deref() {
        validate_start_time(start_time)?;
    }
    if let Some(Some(notes)) = req.notes.as_ref().map(|n| n.as_deref()) {
        validate_notes(Some(notes))?;
    }

    let existing: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT id, client_id, appointment_type_id, appointment_date, start_time, end_time,
               status, notes, created_by, created_at, updated_at, deleted_at
        FROM appointments
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Appointment"))?;

    let client_changed = req.client_id.is_some_and(|c| c != existing.client_id);
    let type_changed = req
        .appointment_type_id
        .is_some_and(|t| t != existing.appointment_type_id);

    let effective_client = req.client_id.unwrap_or(existing.client_id);
    let effective_type = req.appointment_type_id.unwrap_or(existing.appointment_type_id);
    let effective_date = req.appointment_date.unwrap_or(existing.appointment_date);
    let effective_start = match req.start_time.as_deref() {
        Some(s) => schedule::normalize_time(s),
        None => existing.start_time.clone(),
    };

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // Lock the effective client before rescanning; a newly referenced client
    // must exist and not be soft-deleted.
    match lock_client_row(&mut *tx, effective_client).await? {
        Some(None) => {}
        Some(Some(_)) | None if client_changed => return Err(ApiError::not_found("Client")),
        Some(Some(_)) => {}
        None => return Err(ApiError::not_found("Client")),
    }

    // Resolve the type supplying duration for the overlap math. Unchanged
    // type: reuse the current one, without re-checking is_active.
    let appointment_type: AppointmentTypeRow = sqlx::query_as::<_, AppointmentTypeRow>(
        r#"
        SELECT id, name, description, duration_minutes, color, is_active, created_at, updated_at
        FROM appointment_types
        WHERE id = $1
        "#,
    )
    .bind(effective_type)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Appointment type"))?;

    if type_changed && !appointment_type.is_active {
        return Err(ApiError::BadRequest(
            "TYPE_INACTIVE",
            "This appointment type is not active".into(),
        ));
    }

    if let Some(date) = req.appointment_date {
        ensure_future_date(date)?;
    }

    // Re-run the overlap scan only when a scheduling-relevant field came in
    // with the request; a notes-only update never re-checks.
    if req.appointment_date.is_some() || req.start_time.is_some() || req.client_id.is_some() {
        let candidate = schedule::interval(&effective_start, appointment_type.duration_minutes);
        let booked = load_booked_slots(&mut *tx, effective_client, effective_date).await?;
        ensure_no_overlap(candidate, Some(appointment_id), &booked)?;
    }

    let (_, end_minutes) = schedule::interval(&effective_start, appointment_type.duration_minutes);
    let end_time = schedule::format_minutes(end_minutes);

    let notes = match req.notes {
        None => existing.notes.clone(),
        Some(None) => None,
        Some(Some(n)) => Some(n),
    };

    sqlx::query(
        r#"
        UPDATE appointments
        SET client_id = $2,
            appointment_type_id = $3,
            appointment_date = $4,
            start_time = $5,
            end_time = $6,
            notes = $7,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(effective_client)
    .bind(effective_type)
    .bind(effective_date)
    .bind(&effective_start)
    .bind(&end_time)
    .bind(notes.as_deref())
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let detail = fetch_detail(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   PATCH /{id}/status
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<AppointmentDetail>>, ApiError> {
    // Any status may be set from any other; membership in the enum is the
    // only constraint, and serde already enforced that.
    let updated = sqlx::query(
        r#"
        UPDATE appointments
        SET status = $2, updated_at = now()
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(appointment_id)
    .bind(req.status)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Appointment"));
    }

    let detail = fetch_detail(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: detail }))
}

/* ============================================================
   DELETE /{id} (soft)
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let deleted = sqlx::query(
        r#"
        UPDATE appointments
        SET deleted_at = now(), updated_at = now()
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(appointment_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Appointment"));
    }

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hh_mm_and_hh_mm_ss() {
        assert!(validate_start_time("09:30").is_ok());
        assert!(validate_start_time("9:30").is_ok());
        assert!(validate_start_time("23:59:59").is_ok());
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(validate_start_time("24:00").is_err());
        assert!(validate_start_time("10:60").is_err());
        assert!(validate_start_time("10").is_err());
        assert!(validate_start_time("10:5").is_err());
        assert!(validate_start_time("abc").is_err());
        assert!(validate_start_time("10:30:5").is_err());
    }

    #[test]
    fn notes_bound_counts_characters() {
        assert!(validate_notes(Some(&"é".repeat(MAX_NOTES_LEN))).is_ok());
        assert!(validate_notes(Some(&"é".repeat(MAX_NOTES_LEN + 1))).is_err());
    }

    #[test]
    fn past_date_is_day_granular() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert!(is_past_date(today.pred_opt().unwrap(), today));
        assert!(!is_past_date(today, today));
        assert!(!is_past_date(today.succ_opt().unwrap(), today));
    }
}
