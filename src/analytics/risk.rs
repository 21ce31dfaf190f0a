//! Per-employee attrition risk aggregation.
//!
//! State is an exponentially-weighted moving average of response sentiment
//! plus a monotone sample count. Updates are incremental and constant-time:
//! one employee's row, one read-modify-write, serialized by a per-employee
//! lock so near-simultaneous submissions to different surveys cannot lose
//! updates. Different employees never contend.

use crate::config::AnalyticsConfig;
use crate::db;
use crate::domain::models::{AttritionRisk, RiskBucket};
use crate::sentiment;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub struct RiskEngine {
    cfg: AnalyticsConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RiskEngine {
    pub fn new(cfg: AnalyticsConfig) -> Self {
        Self {
            cfg,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// `ewma' = alpha * s + (1 - alpha) * ewma`, initialized to the first
    /// sample.
    pub fn next_ewma(&self, prev: Option<f64>, sample: f64) -> f64 {
        match prev {
            None => sample,
            Some(ewma) => self.cfg.alpha * sample + (1.0 - self.cfg.alpha) * ewma,
        }
    }

    /// Fixed monotone-decreasing map from sentiment EWMA to risk: -1 -> 1.0,
    /// +1 -> 0.0.
    pub fn risk_from_ewma(ewma: f64) -> f64 {
        ((1.0 - ewma) / 2.0).clamp(0.0, 1.0)
    }

    pub fn bucket(&self, risk_score: f64) -> RiskBucket {
        if risk_score >= self.cfg.high_threshold {
            RiskBucket::High
        } else if risk_score >= self.cfg.medium_threshold {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }

    /// Serializes updates for one employee. Hold the returned guard across
    /// the transaction that folds their sample.
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        self.lock_for(user_id).await.lock_owned().await
    }

    /// Folds one new response sentiment into the employee's rolling state and
    /// returns the updated risk score. Runs inside the caller's transaction so
    /// the risk row commits or rolls back together with whatever produced the
    /// sample; the caller holds the employee's `lock`.
    pub async fn fold_response(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: Uuid,
        company_id: Uuid,
        sentiment_value: f64,
    ) -> Result<f64, sqlx::Error> {
        let prev = db::find_risk(&mut **tx, user_id).await?;
        let ewma = self.next_ewma(prev.as_ref().map(|r| r.ewma), sentiment_value);
        let risk = AttritionRisk {
            user_id,
            company_id,
            ewma,
            risk_score: Self::risk_from_ewma(ewma),
            sample_count: prev.map(|r| r.sample_count).unwrap_or(0) + 1,
            updated_at: Utc::now(),
        };
        db::upsert_risk(&mut **tx, &risk).await?;

        tracing::debug!(
            "risk updated: user={} ewma={:.3} risk={:.3} samples={}",
            user_id,
            risk.ewma,
            risk.risk_score,
            risk.sample_count
        );
        Ok(risk.risk_score)
    }

    pub async fn risk_of(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Option<AttritionRisk>, sqlx::Error> {
        db::find_risk(pool, user_id).await
    }

    /// Full replay after a lexicon change: re-scores every stored answer set
    /// and rebuilds each employee's EWMA in submission order. The only batch
    /// re-scan in the system; holds one employee's lock at a time so the hot
    /// path stays responsive. Returns the number of employees touched.
    pub async fn reindex_company(
        &self,
        pool: &SqlitePool,
        company_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let users = db::list_users(pool, company_id).await?;
        let mut touched = 0u64;

        for user in users {
            let lock = self.lock_for(user.id).await;
            let _guard = lock.lock().await;

            let responses = db::list_responses_by_user(pool, user.id).await?;
            if responses.is_empty() {
                continue;
            }

            let mut ewma: Option<f64> = None;
            let mut samples = 0i64;
            for response in &responses {
                let rescored = sentiment::score_response(&response.answers);
                if rescored != response.sentiment {
                    db::update_response_sentiment(pool, response.id, rescored).await?;
                }
                ewma = Some(self.next_ewma(ewma, rescored));
                samples += 1;
            }

            let ewma = ewma.unwrap_or(0.0);
            db::upsert_risk(
                pool,
                &AttritionRisk {
                    user_id: user.id,
                    company_id,
                    ewma,
                    risk_score: Self::risk_from_ewma(ewma),
                    sample_count: samples,
                    updated_at: Utc::now(),
                },
            )
            .await?;
            touched += 1;
        }

        tracing::info!("reindexed {} employees for company {}", touched, company_id);
        Ok(touched)
    }

    async fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
