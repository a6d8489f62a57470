// src/routes/client_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, AppointmentStatus, AppointmentTypeBrief, ClientRow, OkResponse,
        Pagination, PreferredContact, UserBrief,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_clients).post(create_client))
        .route("/{client_id}", get(get_client))
        .route("/{client_id}", put(update_client))
        .route("/{client_id}", delete(delete_client))
}

fn validate_name_part(label: &str, value: &str) -> Result<(), ApiError> {
    // Length bounds count characters, not bytes; accented names stay legal.
    if !(2..=100).contains(&value.chars().count()) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("{label} must be between 2 and 100 characters"),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    // Shape check only; real validation is the mailbox's problem.
    let ok = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !ok {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email must be a valid email address".into(),
        ));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if !(7..=20).contains(&phone.chars().count()) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "phone must be between 7 and 20 characters".into(),
        ));
    }
    Ok(())
}

/* ============================================================
   Projections
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ClientWithCreator {
    #[serde(flatten)]
    pub client: ClientRow,
    pub creator: UserBrief,
}

#[derive(Debug, sqlx::FromRow)]
struct ClientJoinedRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    birth_date: Option<NaiveDate>,
    address: Option<String>,
    preferred_contact: PreferredContact,
    notes: Option<String>,
    created_by: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    creator_full_name: String,
    creator_email: String,
}

impl From<ClientJoinedRow> for ClientWithCreator {
    fn from(r: ClientJoinedRow) -> Self {
        ClientWithCreator {
            creator: UserBrief {
                id: r.created_by,
                full_name: r.creator_full_name,
                email: r.creator_email,
            },
            client: ClientRow {
                id: r.id,
                first_name: r.first_name,
                last_name: r.last_name,
                email: r.email,
                phone: r.phone,
                birth_date: r.birth_date,
                address: r.address,
                preferred_contact: r.preferred_contact,
                notes: r.notes,
                created_by: r.created_by,
                created_at: r.created_at,
                updated_at: r.updated_at,
                deleted_at: r.deleted_at,
            },
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ClientAppointmentRow {
    pub id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    pub type_id: Uuid,
    pub type_name: String,
    pub type_duration_minutes: i32,
    pub type_color: String,
}

#[derive(Debug, Serialize)]
pub struct ClientAppointmentBrief {
    pub id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentTypeBrief,
}

impl From<ClientAppointmentRow> for ClientAppointmentBrief {
    fn from(r: ClientAppointmentRow) -> Self {
        ClientAppointmentBrief {
            id: r.id,
            appointment_date: r.appointment_date,
            start_time: r.start_time,
            end_time: r.end_time,
            status: r.status,
            appointment_type: AppointmentTypeBrief {
                id: r.type_id,
                name: r.type_name,
                duration_minutes: r.type_duration_minutes,
                color: r.type_color,
            },
        }
    }
}

const CLIENT_JOINED_COLUMNS: &str = r#"
    c.id,
    c.first_name,
    c.last_name,
    c.email,
    c.phone,
    c.birth_date,
    c.address,
    c.preferred_contact,
    c.notes,
    c.created_by,
    c.created_at,
    c.updated_at,
    c.deleted_at,
    u.full_name AS creator_full_name,
    u.email AS creator_email
"#;

async fn fetch_client(
    state: &AppState,
    client_id: Uuid,
    include_deleted: bool,
) -> Result<ClientWithCreator, ApiError> {
    let sql = format!(
        r#"
        SELECT {CLIENT_JOINED_COLUMNS}
        FROM clients c
        JOIN users u ON u.id = c.created_by
        WHERE c.id = $1
          AND ($2 OR c.deleted_at IS NULL)
        "#
    );

    let row: ClientJoinedRow = sqlx::query_as::<_, ClientJoinedRow>(&sql)
        .bind(client_id)
        .bind(include_deleted)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("Client"))?;

    Ok(row.into())
}

/* ============================================================
   GET / (search + pagination)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListClientsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientListData {
    pub clients: Vec<ClientWithCreator>,
    pub pagination: Pagination,
}

pub async fn list_clients(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<ListClientsQuery>,
) -> Result<Json<ApiOk<ClientListData>>, ApiError> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "limit must be between 1 and 100".into(),
        ));
    }
    let offset = (page - 1) * limit;

    let like = q
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM clients c
        WHERE c.deleted_at IS NULL
          AND ($1::text IS NULL
               OR c.first_name ILIKE $1
               OR c.last_name ILIKE $1
               OR c.email ILIKE $1
               OR c.phone ILIKE $1)
        "#,
    )
    .bind(like.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let sql = format!(
        r#"
        SELECT {CLIENT_JOINED_COLUMNS}
        FROM clients c
        JOIN users u ON u.id = c.created_by
        WHERE c.deleted_at IS NULL
          AND ($1::text IS NULL
               OR c.first_name ILIKE $1
               OR c.last_name ILIKE $1
               OR c.email ILIKE $1
               OR c.phone ILIKE $1)
        ORDER BY c.created_at DESC
        LIMIT $2 OFFSET $3
        "#
    );

    let rows: Vec<ClientJoinedRow> = sqlx::query_as::<_, ClientJoinedRow>(&sql)
        .bind(like.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: ClientListData {
            clients: rows.into_iter().map(Into::into).collect(),
            pagination: Pagination::new(total, page, limit),
        },
    }))
}

/* ============================================================
   GET /{id} (?include_deleted=true)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct GetClientQuery {
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ClientDetailData {
    #[serde(flatten)]
    pub client: ClientWithCreator,
    pub appointments: Vec<ClientAppointmentBrief>,
}

pub async fn get_client(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Query(q): Query<GetClientQuery>,
) -> Result<Json<ApiOk<ClientDetailData>>, ApiError> {
    let include_deleted = q.include_deleted.unwrap_or(false);
    let client = fetch_client(&state, client_id, include_deleted).await?;

    let appointments: Vec<ClientAppointmentRow> = sqlx::query_as::<_, ClientAppointmentRow>(
        r#"
        SELECT
          a.id,
          a.appointment_date,
          a.start_time,
          a.end_time,
          a.status,
          t.id AS type_id,
          t.name AS type_name,
          t.duration_minutes AS type_duration_minutes,
          t.color AS type_color
        FROM appointments a
        JOIN appointment_types t ON t.id = a.appointment_type_id
        WHERE a.client_id = $1
          AND a.deleted_at IS NULL
        ORDER BY a.appointment_date DESC, a.start_time DESC
        LIMIT 10
        "#,
    )
    .bind(client_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: ClientDetailData {
            client,
            appointments: appointments.into_iter().map(Into::into).collect(),
        },
    }))
}

/* ============================================================
   POST /
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub preferred_contact: Option<PreferredContact>,
    pub notes: Option<String>,
}

pub async fn create_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ApiOk<ClientWithCreator>>), ApiError> {
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let email = req.email.trim();

    validate_name_part("first_name", first_name)?;
    validate_name_part("last_name", last_name)?;
    validate_email(email)?;
    validate_phone(req.phone.trim())?;

    // Email uniqueness is checked against ALL rows, soft-deleted included:
    // a previously deleted client's email stays unavailable and reports a
    // distinct conflict.
    let holder: Option<(Uuid, Option<chrono::DateTime<chrono::Utc>>)> = sqlx::query_as(
        r#"
        SELECT id, deleted_at
        FROM clients
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    match holder {
        Some((_, Some(_))) => {
            return Err(ApiError::Conflict(
                "CLIENT_EMAIL_DELETED",
                "A client with this email was previously deleted. Contact support to restore."
                    .into(),
            ));
        }
        Some((_, None)) => {
            return Err(ApiError::Conflict(
                "CLIENT_EMAIL_EXISTS",
                "A client with this email already exists".into(),
            ));
        }
        None => {}
    }

    let client_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO clients
            (first_name, last_name, email, phone, birth_date, address, preferred_contact, notes, created_by)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(req.phone.trim())
    .bind(req.birth_date)
    .bind(req.address.as_deref())
    .bind(req.preferred_contact.unwrap_or(PreferredContact::Email))
    .bind(req.notes.as_deref())
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let client = fetch_client(&state, client_id, false).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: client })))
}

/* ============================================================
   PUT /{id} (partial)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    // Nullable fields take the double-option form so an explicit `null`
    // clears the column instead of reading as "not sent".
    #[serde(default, deserialize_with = "crate::models::deserialize_double_option")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "crate::models::deserialize_double_option")]
    pub address: Option<Option<String>>,
    pub preferred_contact: Option<PreferredContact>,
    #[serde(default, deserialize_with = "crate::models::deserialize_double_option")]
    pub notes: Option<Option<String>>,
}

pub async fn update_client(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<ApiOk<ClientWithCreator>>, ApiError> {
    let existing: ClientRow = sqlx::query_as::<_, ClientRow>(
        r#"
        SELECT id, first_name, last_name, email, phone, birth_date, address,
               preferred_contact, notes, created_by, created_at, updated_at, deleted_at
        FROM clients
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(client_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("Client"))?;

    let first_name = match req.first_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.first_name.clone(),
    };
    validate_name_part("first_name", &first_name)?;

    let last_name = match req.last_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.last_name.clone(),
    };
    validate_name_part("last_name", &last_name)?;

    let email = match req.email.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.email.clone(),
    };
    validate_email(&email)?;

    let phone = match req.phone.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.phone.clone(),
    };
    validate_phone(&phone)?;

    // Changed email: re-check among non-deleted rows, excluding self.
    if email != existing.email {
        let taken: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM clients
            WHERE email = $1
              AND id <> $2
              AND deleted_at IS NULL
            "#,
        )
        .bind(&email)
        .bind(client_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;

        if taken.is_some() {
            return Err(ApiError::Conflict(
                "CLIENT_EMAIL_EXISTS",
                "A client with this email already exists".into(),
            ));
        }
    }

    let birth_date = match req.birth_date {
        None => existing.birth_date,
        Some(v) => v,
    };
    let address = match req.address {
        None => existing.address.clone(),
        Some(v) => v,
    };
    let preferred_contact = req.preferred_contact.unwrap_or(existing.preferred_contact);
    let notes = match req.notes {
        None => existing.notes.clone(),
        Some(v) => v,
    };

    sqlx::query(
        r#"
        UPDATE clients
        SET first_name = $2,
            last_name = $3,
            email = $4,
            phone = $5,
            birth_date = $6,
            address = $7,
            preferred_contact = $8,
            notes = $9,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&phone)
    .bind(birth_date)
    .bind(address.as_deref())
    .bind(preferred_contact)
    .bind(notes.as_deref())
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    let client = fetch_client(&state, client_id, false).await?;
    Ok(Json(ApiOk { data: client }))
}

/* ============================================================
   DELETE /{id} (soft)
   ============================================================ */

pub async fn delete_client(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let deleted = sqlx::query(
        r#"
        UPDATE clients
        SET deleted_at = now(), updated_at = now()
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(client_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Client"));
    }

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@nodot").is_err());
    }

    #[test]
    fn phone_length() {
        assert!(validate_phone("1234567").is_ok());
        assert!(validate_phone("123456").is_err());
        assert!(validate_phone(&"9".repeat(21)).is_err());
    }

    #[test]
    fn name_bounds_count_characters_not_bytes() {
        // 100 accented characters exceed 100 bytes but stay within bounds.
        assert!(validate_name_part("first_name", &"é".repeat(100)).is_ok());
        assert!(validate_name_part("first_name", &"é".repeat(101)).is_err());
        assert!(validate_name_part("first_name", "Zoë").is_ok());
    }

    #[test]
    fn explicit_null_clears_nullable_update_fields() {
        let req: UpdateClientRequest =
            serde_json::from_str(r#"{"notes": null, "address": null, "birth_date": null}"#)
                .unwrap();
        assert_eq!(req.notes, Some(None));
        assert_eq!(req.address, Some(None));
        assert_eq!(req.birth_date, Some(None));

        // Absent fields stay None and leave the stored value alone.
        let req: UpdateClientRequest = serde_json::from_str(r#"{"phone": "5551234567"}"#).unwrap();
        assert!(req.notes.is_none());
        assert!(req.address.is_none());
        assert!(req.birth_date.is_none());

        let req: UpdateClientRequest =
            serde_json::from_str(r#"{"notes": "walk-in referral"}"#).unwrap();
        assert_eq!(req.notes, Some(Some("walk-in referral".to_string())));
    }
}
