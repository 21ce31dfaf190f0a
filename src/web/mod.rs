pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod employees;
pub mod session;
pub mod surveys;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/api/employees", employees::router(state.clone()))
        .nest("/api/surveys", surveys::router(state.clone()))
        .nest("/api/dashboard", dashboard::router(state.clone()))
        .nest("/api/admin", admin::router(state))
}
