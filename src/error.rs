use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    /// Scheduling conflict: carries the clashing appointment so the
    /// frontend can point at it.
    Overlap {
        existing_appointment_id: Uuid,
        start_time: String,
    },
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{what} not found"))
    }

    /// Full detail goes to the log; the response stays generic.
    pub fn db(e: sqlx::Error) -> Self {
        tracing::error!("database error: {e}");
        ApiError::Internal("database error".into())
    }

    fn to_error_response(
        code: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
                details,
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => (
                StatusCode::UNAUTHORIZED,
                ApiError::to_error_response(code, &msg, None),
            )
                .into_response(),
            ApiError::Forbidden(code, msg) => (
                StatusCode::FORBIDDEN,
                ApiError::to_error_response(code, &msg, None),
            )
                .into_response(),
            ApiError::BadRequest(code, msg) => (
                StatusCode::BAD_REQUEST,
                ApiError::to_error_response(code, &msg, None),
            )
                .into_response(),
            ApiError::NotFound(code, msg) => (
                StatusCode::NOT_FOUND,
                ApiError::to_error_response(code, &msg, None),
            )
                .into_response(),
            ApiError::Conflict(code, msg) => (
                StatusCode::CONFLICT,
                ApiError::to_error_response(code, &msg, None),
            )
                .into_response(),
            ApiError::Overlap {
                existing_appointment_id,
                start_time,
            } => (
                StatusCode::CONFLICT,
                ApiError::to_error_response(
                    "APPOINTMENT_OVERLAP",
                    &format!(
                        "This appointment overlaps with an existing appointment at {start_time}"
                    ),
                    Some(serde_json::json!({
                        "existing_appointment_id": existing_appointment_id,
                        "start_time": start_time,
                    })),
                ),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg, None),
            )
                .into_response(),
        }
    }
}
