pub mod seed;

use crate::domain::models::{
    AttritionRisk, Company, RiskUser, Survey, SurveyResponse, User, UserRole,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SurveyToken {
    pub token: i64,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

// ---- companies ----

pub async fn insert_company<'e, E>(executor: E, name: &str) -> Result<Company, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let company = Company {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO companies (id, name, created_at) VALUES ($1, $2, $3)")
        .bind(company.id)
        .bind(&company.name)
        .bind(company.created_at)
        .execute(executor)
        .await?;
    Ok(company)
}

// ---- users ----

pub async fn insert_user<'e, E>(
    executor: E,
    company_id: Uuid,
    email: &str,
    hash: &str,
    name: &str,
    role: UserRole,
) -> Result<User, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let user = User {
        id: Uuid::new_v4(),
        company_id,
        email: email.to_string(),
        hash: hash.to_string(),
        name: name.to_string(),
        role,
        created_at: Utc::now(),
    };
    sqlx::query(
        r#"
        INSERT INTO users (id, company_id, email, hash, name, role, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user.id)
    .bind(user.company_id)
    .bind(&user.email)
    .bind(&user.hash)
    .bind(&user.name)
    .bind(&user.role)
    .bind(user.created_at)
    .execute(executor)
    .await?;
    Ok(user)
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_users(pool: &SqlitePool, company_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE company_id = $1 ORDER BY created_at ASC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
}

pub async fn count_users(pool: &SqlitePool, company_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(pool)
        .await
}

/// Removes the employee and everything derived from them. Responses and risk
/// state go with the row; surveys they answered stay.
pub async fn delete_user(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM survey_tokens WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM survey_responses WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM attrition_risks WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(deleted)
}

// ---- surveys ----

pub async fn insert_survey(
    pool: &SqlitePool,
    company_id: Uuid,
    title: &str,
    questions: Vec<String>,
) -> Result<Survey, sqlx::Error> {
    let survey = Survey {
        id: Uuid::new_v4(),
        company_id,
        title: title.to_string(),
        questions: sqlx::types::Json(questions),
        is_active: true,
        created_at: Utc::now(),
    };
    sqlx::query(
        r#"
        INSERT INTO surveys (id, company_id, title, questions, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(survey.id)
    .bind(survey.company_id)
    .bind(&survey.title)
    .bind(&survey.questions)
    .bind(survey.is_active)
    .bind(survey.created_at)
    .execute(pool)
    .await?;
    Ok(survey)
}

pub async fn find_survey_by_id(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>("SELECT * FROM surveys WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_surveys(
    pool: &SqlitePool,
    company_id: Uuid,
) -> Result<Vec<Survey>, sqlx::Error> {
    sqlx::query_as::<_, Survey>(
        "SELECT * FROM surveys WHERE company_id = $1 ORDER BY created_at DESC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
}

pub async fn set_survey_active(
    pool: &SqlitePool,
    id: Uuid,
    active: bool,
) -> Result<u64, sqlx::Error> {
    let updated = sqlx::query("UPDATE surveys SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(updated)
}

// ---- survey tokens ----

pub async fn insert_token(
    pool: &SqlitePool,
    token: i64,
    survey_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO survey_tokens (token, survey_id, user_id, used, created_at)
        VALUES ($1, $2, $3, 0, $4)
        "#,
    )
    .bind(token)
    .bind(survey_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_token(
    pool: &SqlitePool,
    token: i64,
) -> Result<Option<SurveyToken>, sqlx::Error> {
    sqlx::query_as::<_, SurveyToken>("SELECT * FROM survey_tokens WHERE token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await
}

pub async fn list_tokens(
    pool: &SqlitePool,
    survey_id: Uuid,
) -> Result<Vec<SurveyToken>, sqlx::Error> {
    sqlx::query_as::<_, SurveyToken>(
        "SELECT * FROM survey_tokens WHERE survey_id = $1 ORDER BY created_at ASC",
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await
}

// ---- responses ----

pub async fn response_exists(
    pool: &SqlitePool,
    survey_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM survey_responses WHERE survey_id = $1 AND user_id = $2",
    )
    .bind(survey_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn list_responses_by_survey(
    pool: &SqlitePool,
    survey_id: Uuid,
) -> Result<Vec<SurveyResponse>, sqlx::Error> {
    sqlx::query_as::<_, SurveyResponse>(
        "SELECT * FROM survey_responses WHERE survey_id = $1 ORDER BY created_at ASC",
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await
}

pub async fn list_responses_by_user(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Vec<SurveyResponse>, sqlx::Error> {
    sqlx::query_as::<_, SurveyResponse>(
        "SELECT * FROM survey_responses WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Responses feeding the factor extractor: company-scoped, below the
/// negativity threshold, in stable first-seen order.
pub async fn list_negative_responses(
    pool: &SqlitePool,
    company_id: Uuid,
    threshold: f64,
) -> Result<Vec<SurveyResponse>, sqlx::Error> {
    sqlx::query_as::<_, SurveyResponse>(
        r#"
        SELECT r.*
        FROM survey_responses r
        JOIN users u ON u.id = r.user_id
        WHERE u.company_id = $1 AND r.sentiment < $2
        ORDER BY r.created_at ASC, r.id ASC
        "#,
    )
    .bind(company_id)
    .bind(threshold)
    .fetch_all(pool)
    .await
}

pub async fn update_response_sentiment(
    pool: &SqlitePool,
    response_id: Uuid,
    sentiment: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE survey_responses SET sentiment = $1 WHERE id = $2")
        .bind(sentiment)
        .bind(response_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---- attrition risk ----

pub async fn find_risk<'e, E>(
    executor: E,
    user_id: Uuid,
) -> Result<Option<AttritionRisk>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, AttritionRisk>("SELECT * FROM attrition_risks WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

pub async fn upsert_risk<'e, E>(executor: E, risk: &AttritionRisk) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO attrition_risks (user_id, company_id, ewma, risk_score, sample_count, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE SET
            ewma = excluded.ewma,
            risk_score = excluded.risk_score,
            sample_count = excluded.sample_count,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(risk.user_id)
    .bind(risk.company_id)
    .bind(risk.ewma)
    .bind(risk.risk_score)
    .bind(risk.sample_count)
    .bind(risk.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_risks(
    pool: &SqlitePool,
    company_id: Uuid,
) -> Result<Vec<AttritionRisk>, sqlx::Error> {
    sqlx::query_as::<_, AttritionRisk>(
        "SELECT * FROM attrition_risks WHERE company_id = $1 ORDER BY risk_score DESC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
}

#[derive(sqlx::FromRow)]
struct RiskWithUserRow {
    user_id: Uuid,
    company_id: Uuid,
    ewma: f64,
    risk_score: f64,
    sample_count: i64,
    updated_at: DateTime<Utc>,
    name: String,
    email: String,
}

/// Risk rows joined with the employee's identity in one round trip; the
/// dashboard builds its high-risk table from this.
pub async fn list_risks_with_users(
    pool: &SqlitePool,
    company_id: Uuid,
) -> Result<Vec<(AttritionRisk, RiskUser)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RiskWithUserRow>(
        r#"
        SELECT r.user_id, r.company_id, r.ewma, r.risk_score, r.sample_count,
               r.updated_at, u.name, u.email
        FROM attrition_risks r
        JOIN users u ON u.id = r.user_id
        WHERE r.company_id = $1
        ORDER BY r.risk_score DESC
        "#,
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                AttritionRisk {
                    user_id: row.user_id,
                    company_id: row.company_id,
                    ewma: row.ewma,
                    risk_score: row.risk_score,
                    sample_count: row.sample_count,
                    updated_at: row.updated_at,
                },
                RiskUser {
                    id: row.user_id,
                    name: row.name,
                    email: row.email,
                },
            )
        })
        .collect())
}

pub async fn delete_risk(pool: &SqlitePool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM attrition_risks WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

// In-memory sqlite is per-connection; a single long-lived connection keeps
// every test query on the same database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_response_violates_unique_constraint() {
        let pool = test_pool().await;
        let company = insert_company(&pool, "Acme").await.unwrap();
        let user = insert_user(&pool, company.id, "a@acme.io", "x", "A", UserRole::Employee)
            .await
            .unwrap();
        let survey = insert_survey(&pool, company.id, "Pulse", vec!["Q1".into()])
            .await
            .unwrap();

        let insert = |id: Uuid| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO survey_responses (id, survey_id, user_id, answers, sentiment, created_at)
                    VALUES ($1, $2, $3, $4, 0, $5)
                    "#,
                )
                .bind(id)
                .bind(survey.id)
                .bind(user.id)
                .bind(sqlx::types::Json(vec!["ok".to_string()]))
                .bind(Utc::now())
                .execute(&pool)
                .await
            }
        };

        insert(Uuid::new_v4()).await.unwrap();
        let err = insert(Uuid::new_v4()).await.unwrap_err();
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique);
    }

    #[tokio::test]
    async fn risks_join_user_identity_in_score_order() {
        let pool = test_pool().await;
        let company = insert_company(&pool, "Acme").await.unwrap();
        let other = insert_company(&pool, "Other").await.unwrap();
        let calm = insert_user(&pool, company.id, "calm@acme.io", "x", "Calm", UserRole::Employee)
            .await
            .unwrap();
        let tense =
            insert_user(&pool, company.id, "tense@acme.io", "x", "Tense", UserRole::Employee)
                .await
                .unwrap();
        for (user, ewma, score) in [(&calm, 0.6, 0.2), (&tense, -0.8, 0.9)] {
            upsert_risk(
                &pool,
                &AttritionRisk {
                    user_id: user.id,
                    company_id: company.id,
                    ewma,
                    risk_score: score,
                    sample_count: 1,
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        let rows = list_risks_with_users(&pool, company.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.user_id, tense.id);
        assert_eq!(rows[0].1.email, "tense@acme.io");
        assert_eq!(rows[1].1.name, "Calm");

        assert!(list_risks_with_users(&pool, other.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_user_removes_derived_rows() {
        let pool = test_pool().await;
        let company = insert_company(&pool, "Acme").await.unwrap();
        let user = insert_user(&pool, company.id, "b@acme.io", "x", "B", UserRole::Employee)
            .await
            .unwrap();
        let risk = AttritionRisk {
            user_id: user.id,
            company_id: company.id,
            ewma: -0.5,
            risk_score: 0.75,
            sample_count: 1,
            updated_at: Utc::now(),
        };
        upsert_risk(&pool, &risk).await.unwrap();

        assert_eq!(delete_user(&pool, user.id).await.unwrap(), 1);
        assert!(find_risk(&pool, user.id).await.unwrap().is_none());
        assert!(find_user_by_id(&pool, user.id).await.unwrap().is_none());
    }
}
