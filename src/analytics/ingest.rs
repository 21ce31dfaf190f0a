//! Response ingestion gate: validates and admits exactly one response per
//! (survey, employee) pair, then synchronously folds the new sentiment into
//! the risk aggregate and invalidates the dashboard cache. A successful
//! return means the employee's risk state already reflects the response.

use crate::error::ApiError;
use crate::sentiment;
use crate::state::AppState;
use crate::db;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub survey_id: Uuid,
    pub user_token: i64,
    pub responses: Vec<String>,
}

pub async fn submit(state: &AppState, req: SubmitRequest) -> Result<Uuid, ApiError> {
    // Single-use token bound to one (survey, employee) pair.
    let token = db::find_token(&state.pool, req.user_token)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if token.used || token.survey_id != req.survey_id {
        return Err(ApiError::Unauthorized);
    }
    let user = db::find_user_by_id(&state.pool, token.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let survey = db::find_survey_by_id(&state.pool, req.survey_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if survey.company_id != user.company_id {
        return Err(ApiError::NotFound);
    }
    if !survey.is_active {
        return Err(ApiError::Closed);
    }

    if req.responses.len() != survey.questions.len() {
        return Err(ApiError::Invalid(format!(
            "expected {} answers, got {}",
            survey.questions.len(),
            req.responses.len()
        )));
    }
    if req.responses.iter().any(|a| a.trim().is_empty()) {
        return Err(ApiError::Invalid("answers must not be blank".to_string()));
    }

    if db::response_exists(&state.pool, survey.id, user.id).await? {
        return Err(ApiError::Duplicate);
    }

    // The scorer is total; nothing past this point can fail for content
    // reasons.
    let sentiment_value = sentiment::score_response(&req.responses);

    // Response row, token consumption and the risk fold commit as one unit:
    // an acknowledged submission is always reflected in attrition_risks.
    let response_id = Uuid::new_v4();
    let _guard = state.risk.lock(user.id).await;
    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO survey_responses (id, survey_id, user_id, answers, sentiment, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(response_id)
    .bind(survey.id)
    .bind(user.id)
    .bind(sqlx::types::Json(req.responses))
    .bind(sentiment_value)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await;
    match inserted {
        Ok(_) => {}
        // Lost the race with a concurrent submit for the same pair.
        Err(e) if db::is_unique_violation(&e) => return Err(ApiError::Duplicate),
        Err(e) => return Err(e.into()),
    }
    sqlx::query("UPDATE survey_tokens SET used = 1 WHERE token = $1")
        .bind(req.user_token)
        .execute(&mut *tx)
        .await?;
    let risk_score = state
        .risk
        .fold_response(&mut tx, user.id, user.company_id, sentiment_value)
        .await?;
    tx.commit().await?;
    state.snapshots.invalidate(user.company_id).await;

    tracing::info!(
        "response recorded: survey={} user={} sentiment={:.3} risk={:.3}",
        survey.id,
        user.id,
        sentiment_value,
        risk_score
    );
    Ok(response_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::domain::models::{User, UserRole};
    use crate::state::SharedState;

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

    async fn fixture(state: &AppState) -> (Uuid, User, i64) {
        let company = db::insert_company(&state.pool, "Acme").await.unwrap();
        let user = db::insert_user(
            &state.pool,
            company.id,
            "emp@acme.io",
            "x",
            "Emp",
            UserRole::Employee,
        )
        .await
        .unwrap();
        let survey = db::insert_survey(
            &state.pool,
            company.id,
            "Pulse",
            vec!["How are you?".into(), "Anything else?".into()],
        )
        .await
        .unwrap();
        db::insert_token(&state.pool, 123456789, survey.id, user.id)
            .await
            .unwrap();
        (survey.id, user, 123456789)
    }

    fn request(survey_id: Uuid, token: i64, answers: &[&str]) -> SubmitRequest {
        SubmitRequest {
            survey_id,
            user_token: token,
            responses: answers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn happy_path_records_response_and_risk() {
        let state = test_state().await;
        let (survey_id, user, token) = fixture(&state).await;

        let id = submit(&state, request(survey_id, token, &["I feel great", "No complaints"]))
            .await
            .unwrap();
        assert_ne!(id, Uuid::nil());

        let risk = state.risk.risk_of(&state.pool, user.id).await.unwrap().unwrap();
        assert_eq!(risk.sample_count, 1);
        assert!(risk.risk_score < 0.3);
        assert!(risk.ewma > 0.0);
    }

    #[tokio::test]
    async fn negative_submission_lands_in_high_bucket() {
        let state = test_state().await;
        let (survey_id, user, token) = fixture(&state).await;

        submit(
            &state,
            request(survey_id, token, &["I am burned out", "never any support"]),
        )
        .await
        .unwrap();

        let risk = state.risk.risk_of(&state.pool, user.id).await.unwrap().unwrap();
        assert!(risk.ewma < -0.2);
        assert!(risk.risk_score >= 0.7);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let state = test_state().await;
        let (survey_id, _, _) = fixture(&state).await;
        let err = submit(&state, request(survey_id, 42, &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn token_bound_to_other_survey_is_unauthorized() {
        let state = test_state().await;
        let (_, _, token) = fixture(&state).await;
        let err = submit(&state, request(Uuid::new_v4(), token, &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn inactive_survey_is_closed() {
        let state = test_state().await;
        let (survey_id, _, token) = fixture(&state).await;
        db::set_survey_active(&state.pool, survey_id, false)
            .await
            .unwrap();
        let err = submit(&state, request(survey_id, token, &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Closed));
    }

    #[tokio::test]
    async fn answer_count_mismatch_is_invalid() {
        let state = test_state().await;
        let (survey_id, _, token) = fixture(&state).await;
        let err = submit(&state, request(survey_id, token, &["only one"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn blank_answer_is_invalid() {
        let state = test_state().await;
        let (survey_id, _, token) = fixture(&state).await;
        let err = submit(&state, request(survey_id, token, &["fine", "   "]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[tokio::test]
    async fn resubmission_is_rejected_and_state_changes_once() {
        let state = test_state().await;
        let (survey_id, user, token) = fixture(&state).await;

        submit(&state, request(survey_id, token, &["good", "good"]))
            .await
            .unwrap();
        let after_first = state.risk.risk_of(&state.pool, user.id).await.unwrap().unwrap();

        // Token is spent now.
        let err = submit(&state, request(survey_id, token, &["bad", "bad"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        // Even with a fresh token the (survey, user) pair stays closed.
        db::insert_token(&state.pool, 987654321, survey_id, user.id)
            .await
            .unwrap();
        let err = submit(&state, request(survey_id, 987654321, &["bad", "bad"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate));

        let after_second = state.risk.risk_of(&state.pool, user.id).await.unwrap().unwrap();
        assert_eq!(after_first.sample_count, after_second.sample_count);
        assert_eq!(after_first.ewma, after_second.ewma);
    }

    #[tokio::test]
    async fn cross_company_survey_is_not_found() {
        let state = test_state().await;
        let (_, user, _) = fixture(&state).await;
        let other = db::insert_company(&state.pool, "Other").await.unwrap();
        let foreign_survey =
            db::insert_survey(&state.pool, other.id, "Theirs", vec!["Q".into()])
                .await
                .unwrap();
        db::insert_token(&state.pool, 555, foreign_survey.id, user.id)
            .await
            .unwrap();

        let err = submit(&state, request(foreign_survey.id, 555, &["hello"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
