use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Enums (Postgres enum types, see migrations/001_init.sql)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
    Receptionist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "preferred_contact", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PreferredContact {
    Email,
    Phone,
    Whatsapp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Cancelled and no-show appointments never block a new booking.
    pub fn blocks_schedule(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }
}

/* -------------------------
   Serde helpers
--------------------------*/

/// Distinguishes "field absent" from "field explicitly null" in partial
/// updates. Used together with `#[serde(default)]`: absent stays `None`,
/// `null` becomes `Some(None)` and clears the column, a value becomes
/// `Some(Some(v))`.
pub fn deserialize_double_option<'de, D, T>(
    deserializer: D,
) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Invoked only when the field is present (even as `null`).
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}

/* -------------------------
   Generic response wrappers
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse {
            data: OkData { ok: true },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        Pagination {
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit.max(1),
        }
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub preferred_contact: PreferredContact,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentTypeRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub color: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub appointment_type_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/* -------------------------
   Joined projections
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ClientBrief {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentTypeBrief {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct UserBrief {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDetail {
    pub id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub client: ClientBrief,
    pub appointment_type: AppointmentTypeBrief,
    pub creator: UserBrief,
}
