use crate::db;
use crate::domain::models::UserRole;
use crate::error::ApiError;
use crate::middleware::RateLimiter;
use crate::state::SharedState;
use crate::web::session;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static LOGIN_RATE_LIMITER: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(5, 60));

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub company_name: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: UserRole,
    pub name: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state)
}

/// Bootstraps a tenant: a company plus its first HR admin.
async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.company_name.trim().is_empty()
        || payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
    {
        return Err(ApiError::Invalid(
            "company_name, name and email are required".to_string(),
        ));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Invalid(
            "password must be at least 8 characters".to_string(),
        ));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("password hashing failed: {}", e);
            ApiError::Invalid("could not process password".to_string())
        })?
        .to_string();

    // Company and admin commit together; a taken email rolls both back.
    let mut tx = state.pool.begin().await?;
    let company = db::insert_company(&mut *tx, payload.company_name.trim()).await?;
    let user = match db::insert_user(
        &mut *tx,
        company.id,
        payload.email.trim(),
        &hash,
        payload.name.trim(),
        UserRole::HrAdmin,
    )
    .await
    {
        Ok(user) => user,
        Err(e) if db::is_unique_violation(&e) => return Err(ApiError::Duplicate),
        Err(e) => return Err(e.into()),
    };
    tx.commit().await?;

    tracing::info!("registered company {} with admin {}", company.id, user.id);
    let (headers, body) = login_success(&state, user.id, company.id, UserRole::HrAdmin, user.name);
    Ok((StatusCode::CREATED, headers, body))
}

async fn login(
    headers: HeaderMap,
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers);
    if !LOGIN_RATE_LIMITER.check(&ip).await {
        tracing::warn!("login rate limit exceeded for {}", ip);
        return Err(ApiError::RateLimited);
    }

    let user = db::find_user_by_email(&state.pool, payload.email.trim())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed = PasswordHash::new(&user.hash).map_err(|_| ApiError::Unauthorized)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)?;

    let (headers, body) = login_success(&state, user.id, user.company_id, user.role, user.name);
    Ok((StatusCode::OK, headers, body))
}

fn login_success(
    state: &SharedState,
    user_id: Uuid,
    company_id: Uuid,
    role: UserRole,
    name: String,
) -> (HeaderMap, Json<LoginResponse>) {
    let mut headers = HeaderMap::new();
    if let Ok(token) = session::sign_session(user_id, company_id, &role, &state.config.session_key)
    {
        if let Ok(value) =
            format!("session={token}; HttpOnly; SameSite=Lax; Path=/").parse()
        {
            headers.insert(axum::http::header::SET_COOKIE, value);
        }
    }
    (
        headers,
        Json(LoginResponse {
            user_id,
            company_id,
            role,
            name,
        }),
    )
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::error::ApiError;
    use crate::state::AppState;

    async fn test_state() -> SharedState {
        let pool = test_pool().await;
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            session_key: b"test-session-key".to_vec(),
            analytics: Default::default(),
        };
        AppState::new(pool, config)
    }

    fn registration(company_name: &str) -> RegisterRequest {
        RegisterRequest {
            company_name: company_name.to_string(),
            name: "Ann".to_string(),
            email: "ann@acme.io".to_string(),
            password: "long-enough-pass".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_no_orphan_company() {
        let state = test_state().await;

        register(State(state.clone()), Json(registration("First Co")))
            .await
            .map(|_| ())
            .unwrap();

        let second = register(State(state.clone()), Json(registration("Second Co")))
            .await
            .map(|_| ());
        assert!(matches!(second, Err(ApiError::Duplicate)));

        let companies = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM companies")
            .fetch_one(&state.pool)
            .await
            .unwrap();
        assert_eq!(companies, 1);
    }
}
