use crate::analytics::ingest::{self, SubmitRequest};
use crate::db::{self, SurveyToken};
use crate::domain::models::{RiskUser, Survey, UserRole};
use crate::error::ApiError;
use crate::middleware::RateLimiter;
use crate::state::SharedState;
use crate::web::session::AdminSession;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

static PUBLIC_SUBMIT_RATE_LIMITER: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(10, 60));

#[derive(Deserialize)]
pub struct CreateSurveyRequest {
    pub title: String,
    pub questions: Vec<String>,
}

#[derive(Serialize)]
pub struct PublicSurvey {
    pub id: Uuid,
    pub title: String,
    pub questions: Vec<String>,
}

#[derive(Serialize)]
pub struct ResponseWithUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub responses: Vec<String>,
    pub sentiment: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub user: RiskUser,
}

#[derive(Serialize)]
pub struct SurveyResponsesView {
    pub survey: Survey,
    pub responses: Vec<ResponseWithUser>,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create_survey).get(list_surveys))
        .route("/:id/tokens", get(list_survey_tokens))
        .route("/:id/active", put(set_active))
        .route("/:id/responses", get(survey_responses))
        // No session on these two: the survey link and the token-authenticated
        // submission endpoint are what employees actually touch.
        .route("/:id/public", get(public_survey))
        .route("/responses/public", post(submit_public_response))
        .with_state(state)
}

async fn create_survey(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateSurveyRequest>,
) -> Result<(StatusCode, Json<Survey>), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Invalid("title is required".to_string()));
    }
    if payload.questions.is_empty() {
        return Err(ApiError::Invalid(
            "a survey needs at least one question".to_string(),
        ));
    }
    if payload.questions.iter().any(|q| q.trim().is_empty()) {
        return Err(ApiError::Invalid("questions must not be blank".to_string()));
    }

    let survey = db::insert_survey(
        &state.pool,
        claims.company_id,
        payload.title.trim(),
        payload.questions,
    )
    .await?;

    // One single-use token per employee; HR distributes them out of band
    // (email delivery is an external collaborator).
    let users = db::list_users(&state.pool, claims.company_id).await?;
    let mut minted = 0usize;
    for user in users.iter().filter(|u| u.role == UserRole::Employee) {
        mint_token(&state, survey.id, user.id).await?;
        minted += 1;
    }

    tracing::info!(
        "survey {} created for company {} with {} invitation tokens",
        survey.id,
        claims.company_id,
        minted
    );
    Ok((StatusCode::CREATED, Json(survey)))
}

async fn list_surveys(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Survey>>, ApiError> {
    let surveys = db::list_surveys(&state.pool, claims.company_id).await?;
    Ok(Json(surveys))
}

async fn list_survey_tokens(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SurveyToken>>, ApiError> {
    let survey = owned_survey(&state, claims.company_id, id).await?;
    let tokens = db::list_tokens(&state.pool, survey.id).await?;
    Ok(Json(tokens))
}

async fn set_active(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<Survey>, ApiError> {
    let survey = owned_survey(&state, claims.company_id, id).await?;
    db::set_survey_active(&state.pool, survey.id, payload.active).await?;
    let survey = db::find_survey_by_id(&state.pool, survey.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!("survey {} active={}", survey.id, survey.is_active);
    Ok(Json(survey))
}

async fn survey_responses(
    AdminSession(claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurveyResponsesView>, ApiError> {
    let survey = owned_survey(&state, claims.company_id, id).await?;
    let rows = db::list_responses_by_survey(&state.pool, survey.id).await?;

    let mut responses = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(user) = db::find_user_by_id(&state.pool, row.user_id).await? else {
            continue;
        };
        responses.push(ResponseWithUser {
            id: row.id,
            user_id: row.user_id,
            responses: row.answers.0,
            sentiment: row.sentiment,
            created_at: row.created_at,
            user: RiskUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
        });
    }

    Ok(Json(SurveyResponsesView { survey, responses }))
}

/// Public view of an active survey: questions only, never answers.
async fn public_survey(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicSurvey>, ApiError> {
    let survey = db::find_survey_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !survey.is_active {
        return Err(ApiError::Closed);
    }
    Ok(Json(PublicSurvey {
        id: survey.id,
        title: survey.title,
        questions: survey.questions.0,
    }))
}

async fn submit_public_response(
    headers: HeaderMap,
    State(state): State<SharedState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .unwrap_or("unknown")
        .to_string();
    if !PUBLIC_SUBMIT_RATE_LIMITER.check(&ip).await {
        tracing::warn!("public submit rate limit exceeded for {}", ip);
        return Err(ApiError::RateLimited);
    }

    ingest::submit(&state, payload).await?;
    Ok(Json(json!({ "message": "Response submitted successfully" })))
}

async fn owned_survey(
    state: &SharedState,
    company_id: Uuid,
    survey_id: Uuid,
) -> Result<Survey, ApiError> {
    let survey = db::find_survey_by_id(&state.pool, survey_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if survey.company_id != company_id {
        return Err(ApiError::NotFound);
    }
    Ok(survey)
}

async fn mint_token(state: &SharedState, survey_id: Uuid, user_id: Uuid) -> Result<i64, ApiError> {
    // Nine-digit numeric tokens; retry the rare collision.
    for _ in 0..5 {
        let token: i64 = rand::thread_rng().gen_range(100_000_000..1_000_000_000);
        match db::insert_token(&state.pool, token, survey_id, user_id).await {
            Ok(()) => return Ok(token),
            Err(e) if db::is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Invalid(
        "could not allocate a survey token".to_string(),
    ))
}
