use crate::analytics::snapshot;
use crate::domain::models::DashboardSnapshot;
use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::AdminSession;
use axum::{extract::State, routing::get, Json, Router};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(company_dashboard))
        .with_state(state)
}

async fn company_dashboard(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let snap = snapshot::snapshot(&state, claims.company_id).await?;
    Ok(Json(snap))
}
