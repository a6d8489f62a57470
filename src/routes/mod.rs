use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod appointment_type_routes;
pub mod auth_routes;
pub mod client_routes;
pub mod health_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1/clients", client_routes::router())
        .nest("/api/v1/appointment-types", appointment_type_routes::router())
        .nest("/api/v1/appointments", appointment_routes::router())
        .merge(health_routes::router())
        .with_state(state)
}
