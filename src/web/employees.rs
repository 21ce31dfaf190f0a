use crate::db;
use crate::domain::models::{User, UserRole};
use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::{AdminSession, UserSession};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct BulkImportRequest {
    pub employees: Vec<NewEmployee>,
}

#[derive(Serialize)]
pub struct BulkImportResult {
    pub imported: usize,
    pub skipped: Vec<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(add_employee).get(list_employees))
        .route("/bulk", post(bulk_import))
        .route("/:id", delete(remove_employee))
        .with_state(state)
}

async fn add_employee(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<NewEmployee>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = insert_employee(&state, claims.company_id, &payload).await?;
    state.snapshots.invalidate(claims.company_id).await;
    tracing::info!("employee {} added to company {}", user.id, claims.company_id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Batch variant of add: partial success is reported, not rolled back, so a
/// single bad row does not sink a large import.
async fn bulk_import(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<BulkImportRequest>,
) -> Result<Json<BulkImportResult>, ApiError> {
    let mut imported = 0;
    let mut skipped = Vec::new();
    for entry in &payload.employees {
        match insert_employee(&state, claims.company_id, entry).await {
            Ok(_) => imported += 1,
            Err(ApiError::Storage(e)) => return Err(ApiError::Storage(e)),
            Err(e) => {
                tracing::warn!("bulk import skipped {}: {}", entry.email, e);
                skipped.push(entry.email.clone());
            }
        }
    }
    if imported > 0 {
        state.snapshots.invalidate(claims.company_id).await;
    }
    tracing::info!(
        "bulk import for company {}: {} imported, {} skipped",
        claims.company_id,
        imported,
        skipped.len()
    );
    Ok(Json(BulkImportResult { imported, skipped }))
}

async fn list_employees(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = db::list_users(&state.pool, claims.company_id).await?;
    Ok(Json(users))
}

async fn remove_employee(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = db::find_user_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if user.company_id != claims.company_id {
        return Err(ApiError::NotFound);
    }

    db::delete_user(&state.pool, id).await?;
    state.snapshots.invalidate(claims.company_id).await;
    tracing::info!("employee {} removed from company {}", id, claims.company_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn insert_employee(
    state: &SharedState,
    company_id: Uuid,
    entry: &NewEmployee,
) -> Result<User, ApiError> {
    let email = entry.email.trim();
    if entry.name.trim().is_empty() || email.is_empty() {
        return Err(ApiError::Invalid("name and email are required".to_string()));
    }
    if db::find_user_by_email(&state.pool, email).await?.is_some() {
        return Err(ApiError::Duplicate);
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(entry.password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("password hashing failed: {}", e);
            ApiError::Invalid("could not process password".to_string())
        })?
        .to_string();

    Ok(db::insert_user(
        &state.pool,
        company_id,
        email,
        &hash,
        entry.name.trim(),
        UserRole::Employee,
    )
    .await?)
}
