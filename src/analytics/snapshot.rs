//! Company dashboard composition with a process-wide, per-company cache.
//!
//! The cache is read-mostly with a short TTL, but never relies on the TTL
//! alone: every state-mutating path (ingest, employee add/remove, reindex)
//! calls `invalidate` before returning, so a stale snapshot is never served
//! after a write. A per-company generation counter guards the rebuild path:
//! a snapshot built concurrently with a write observes a stale generation and
//! is not cached.

use crate::analytics::factors;
use crate::db;
use crate::domain::models::{DashboardSnapshot, RiskBucket, RiskRow};
use crate::error::ApiError;
use crate::state::AppState;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct SnapshotCache {
    inner: RwLock<Inner>,
    ttl: Duration,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, CacheEntry>,
    // Bumped on every invalidation; a rebuild that started before the bump
    // must not be cached.
    generations: HashMap<Uuid, u64>,
}

struct CacheEntry {
    built_at: Instant,
    snapshot: DashboardSnapshot,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
        }
    }

    pub async fn get(&self, company_id: Uuid) -> Option<DashboardSnapshot> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&company_id)
            .filter(|e| e.built_at.elapsed() < self.ttl)
            .map(|e| e.snapshot.clone())
    }

    /// Generation to observe before rebuilding; pair with `put_if_unchanged`.
    pub async fn generation(&self, company_id: Uuid) -> u64 {
        let inner = self.inner.read().await;
        inner.generations.get(&company_id).copied().unwrap_or(0)
    }

    /// Stores a rebuilt snapshot unless a write invalidated the company while
    /// it was being built. Returns whether the snapshot was cached.
    pub async fn put_if_unchanged(
        &self,
        company_id: Uuid,
        generation: u64,
        snapshot: DashboardSnapshot,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if inner.generations.get(&company_id).copied().unwrap_or(0) != generation {
            return false;
        }
        inner.entries.insert(
            company_id,
            CacheEntry {
                built_at: Instant::now(),
                snapshot,
            },
        );
        true
    }

    pub async fn invalidate(&self, company_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.entries.remove(&company_id);
        *inner.generations.entry(company_id).or_insert(0) += 1;
    }
}

pub async fn snapshot(state: &AppState, company_id: Uuid) -> Result<DashboardSnapshot, ApiError> {
    if let Some(cached) = state.snapshots.get(company_id).await {
        return Ok(cached);
    }

    let generation = state.snapshots.generation(company_id).await;
    let built = build(state, company_id).await?;
    state
        .snapshots
        .put_if_unchanged(company_id, generation, built.clone())
        .await;
    Ok(built)
}

async fn build(state: &AppState, company_id: Uuid) -> Result<DashboardSnapshot, ApiError> {
    let cfg = &state.config.analytics;
    let total_employees = db::count_users(&state.pool, company_id).await?;
    let risks = db::list_risks_with_users(&state.pool, company_id).await?;

    let avg_sentiment = if risks.is_empty() {
        0.0
    } else {
        risks.iter().map(|(r, _)| r.ewma).sum::<f64>() / risks.len() as f64
    };

    let attrition_risks: Vec<RiskRow> = risks
        .into_iter()
        .filter(|(r, _)| state.risk.bucket(r.risk_score) == RiskBucket::High)
        .map(|(r, user)| RiskRow {
            id: r.user_id,
            user_id: r.user_id,
            risk_score: r.risk_score,
            user,
        })
        .collect();
    let at_risk_employees = attrition_risks.len() as i64;

    // Policy proxy for churn: the high-bucket share as a percentage. Not a
    // time-series estimate.
    let churn_rate = if total_employees > 0 {
        at_risk_employees as f64 / total_employees as f64 * 100.0
    } else {
        0.0
    };

    let top_risk_factors =
        factors::top_factors(&state.pool, cfg, company_id, cfg.top_factors).await?;

    Ok(DashboardSnapshot {
        total_employees,
        at_risk_employees,
        avg_sentiment,
        churn_rate,
        top_risk_factors,
        attrition_risks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::ingest::{self, SubmitRequest};
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

    async fn company_with_survey(state: &AppState) -> (Uuid, Uuid) {
        let company = db::insert_company(&state.pool, "Acme").await.unwrap();
        let survey = db::insert_survey(
            &state.pool,
            company.id,
            "Pulse",
            vec!["How is work?".into(), "Anything else?".into()],
        )
        .await
        .unwrap();
        (company.id, survey.id)
    }

    async fn employee(state: &AppState, company_id: Uuid, email: &str) -> User {
        db::insert_user(&state.pool, company_id, email, "x", "E", UserRole::Employee)
            .await
            .unwrap()
    }

    async fn submit_for(
        state: &AppState,
        survey_id: Uuid,
        user_id: Uuid,
        token: i64,
        answers: [&str; 2],
    ) {
        db::insert_token(&state.pool, token, survey_id, user_id)
            .await
            .unwrap();
        ingest::submit(
            state,
            SubmitRequest {
                survey_id,
                user_token: token,
                responses: answers.iter().map(|s| s.to_string()).collect(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn empty_company_snapshot_is_zeroed() {
        let state = test_state().await;
        let (company_id, _) = company_with_survey(&state).await;
        let snap = snapshot(&state, company_id).await.unwrap();
        assert_eq!(snap.total_employees, 0);
        assert_eq!(snap.at_risk_employees, 0);
        assert_eq!(snap.avg_sentiment, 0.0);
        assert_eq!(snap.churn_rate, 0.0);
        assert!(snap.top_risk_factors.is_empty());
        assert!(snap.attrition_risks.is_empty());
    }

    #[tokio::test]
    async fn counts_track_risk_rows_across_interleaved_reads() {
        let state = test_state().await;
        let (company_id, survey_id) = company_with_survey(&state).await;
        let happy = employee(&state, company_id, "happy@acme.io").await;
        let unhappy = employee(&state, company_id, "unhappy@acme.io").await;

        // Warm the cache, then submit; the write must invalidate it.
        let _ = snapshot(&state, company_id).await.unwrap();
        submit_for(
            &state,
            survey_id,
            happy.id,
            1001,
            ["I feel great", "No complaints"],
        )
        .await;

        let snap = snapshot(&state, company_id).await.unwrap();
        assert_eq!(snap.total_employees, 2);
        assert_eq!(snap.at_risk_employees, 0);
        assert!(snap.avg_sentiment > 0.0);

        let _ = snapshot(&state, company_id).await.unwrap();
        submit_for(
            &state,
            survey_id,
            unhappy.id,
            1002,
            ["I am burned out", "never any support"],
        )
        .await;

        let snap = snapshot(&state, company_id).await.unwrap();
        assert_eq!(snap.at_risk_employees, 1);
        assert_eq!(snap.churn_rate, 50.0);
        assert_eq!(snap.attrition_risks.len(), 1);
        assert_eq!(snap.attrition_risks[0].user_id, unhappy.id);
        assert_eq!(snap.attrition_risks[0].user.email, "unhappy@acme.io");

        // Count invariant: at_risk == rows with risk_score >= high threshold.
        let risks = db::list_risks(&state.pool, company_id).await.unwrap();
        let high = risks
            .iter()
            .filter(|r| r.risk_score >= state.config.analytics.high_threshold)
            .count() as i64;
        assert_eq!(snap.at_risk_employees, high);
    }

    #[tokio::test]
    async fn negative_submission_surfaces_factors() {
        let state = test_state().await;
        let (company_id, survey_id) = company_with_survey(&state).await;
        let emp = employee(&state, company_id, "e@acme.io").await;
        submit_for(
            &state,
            survey_id,
            emp.id,
            2001,
            ["I am burned out", "never any support"],
        )
        .await;

        let snap = snapshot(&state, company_id).await.unwrap();
        assert!(
            snap.top_risk_factors.iter().any(|f| f.contains("burned"))
                || snap.top_risk_factors.iter().any(|f| f.contains("support"))
        );
    }

    #[tokio::test]
    async fn rebuild_overlapping_a_write_is_not_cached() {
        let state = test_state().await;
        let (company_id, _) = company_with_survey(&state).await;

        // A reader misses the cache, notes the generation and starts building.
        let generation = state.snapshots.generation(company_id).await;

        // A write lands (and invalidates) before the rebuild finishes.
        employee(&state, company_id, "late@acme.io").await;
        state.snapshots.invalidate(company_id).await;

        // The reader's snapshot reflects pre-write state; caching it must fail.
        let stale = DashboardSnapshot {
            total_employees: 0,
            at_risk_employees: 0,
            avg_sentiment: 0.0,
            churn_rate: 0.0,
            top_risk_factors: Vec::new(),
            attrition_risks: Vec::new(),
        };
        let cached = state
            .snapshots
            .put_if_unchanged(company_id, generation, stale)
            .await;
        assert!(!cached);

        // The next read rebuilds from current state instead of serving the
        // stale copy for the rest of the TTL.
        let fresh = snapshot(&state, company_id).await.unwrap();
        assert_eq!(fresh.total_employees, 1);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let state = test_state().await;
        let (company_id, _) = company_with_survey(&state).await;

        let first = snapshot(&state, company_id).await.unwrap();
        assert_eq!(first.total_employees, 0);

        // New employee without invalidation: the cached copy still serves.
        employee(&state, company_id, "new@acme.io").await;
        let cached = snapshot(&state, company_id).await.unwrap();
        assert_eq!(cached.total_employees, 0);

        // Invalidation makes the write visible immediately.
        state.snapshots.invalidate(company_id).await;
        let fresh = snapshot(&state, company_id).await.unwrap();
        assert_eq!(fresh.total_employees, 1);
    }
}
