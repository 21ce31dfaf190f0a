use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::AdminSession;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/reindex", post(reindex))
        .with_state(state)
}

/// Re-scores every stored response for the company and replays the risk
/// history from scratch. Run after a lexicon change.
async fn reindex(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let touched = state
        .risk
        .reindex_company(&state.pool, claims.company_id)
        .await?;
    state.snapshots.invalidate(claims.company_id).await;
    tracing::info!(
        "reindexed {} employees for company {}",
        touched,
        claims.company_id
    );
    Ok(Json(json!({ "reindexed": touched })))
}
