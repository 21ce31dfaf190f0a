use crate::analytics::risk::RiskEngine;
use crate::analytics::snapshot::SnapshotCache;
use crate::config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub risk: RiskEngine,
    pub snapshots: SnapshotCache,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> SharedState {
        let risk = RiskEngine::new(config.analytics.clone());
        let snapshots = SnapshotCache::new(config.analytics.snapshot_ttl);
        Arc::new(Self {
            pool,
            config,
            risk,
            snapshots,
        })
    }
}
