use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    HrAdmin,
    Employee,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub hash: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Survey {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub questions: sqlx::types::Json<Vec<String>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub answers: sqlx::types::Json<Vec<String>>,
    pub sentiment: f64,
    pub created_at: DateTime<Utc>,
}

/// EWMA state per employee. Owned by the risk aggregator; the read path
/// never mutates it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttritionRisk {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub ewma: f64,
    pub risk_score: f64,
    pub sample_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub risk_score: f64,
    pub user: RiskUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Derived read model for the company dashboard. Reconstructible from
/// attrition_risks + survey_responses; cached, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub total_employees: i64,
    pub at_risk_employees: i64,
    pub avg_sentiment: f64,
    /// Share of employees in the high bucket, as a percentage. A policy
    /// stand-in, not a validated churn estimate.
    pub churn_rate: f64,
    pub top_risk_factors: Vec<String>,
    pub attrition_risks: Vec<RiskRow>,
}
