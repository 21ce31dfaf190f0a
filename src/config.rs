use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Policy constants for the analytics engine. These are configuration, not
/// per-call-site literals; every component reads them from here.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// EWMA smoothing weight for new samples, in (0, 1].
    pub alpha: f64,
    /// risk_score at or above this is the `high` bucket.
    pub high_threshold: f64,
    /// risk_score at or above this (and below high) is `medium`.
    pub medium_threshold: f64,
    /// Responses with sentiment strictly below this feed the factor extractor.
    pub negativity_threshold: f64,
    /// Number of risk factors surfaced on the dashboard.
    pub top_factors: usize,
    /// Dashboard snapshot TTL; writes invalidate eagerly regardless.
    pub snapshot_ttl: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            high_threshold: 0.7,
            medium_threshold: 0.4,
            negativity_threshold: -0.2,
            top_factors: 5,
            snapshot_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_key: Vec<u8>,
    pub analytics: AnalyticsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://staffpulse.db".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
            let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            format!("0.0.0.0:{port}")
        });

        let session_key = std::env::var("SESSION_KEY")
            .context("SESSION_KEY missing")?
            .into_bytes();
        if session_key.len() < 16 {
            bail!("SESSION_KEY must be at least 16 bytes");
        }

        let mut analytics = AnalyticsConfig::default();
        if let Ok(raw) = std::env::var("RISK_EWMA_ALPHA") {
            analytics.alpha = raw.parse().context("RISK_EWMA_ALPHA must be a float")?;
        }
        if let Ok(raw) = std::env::var("RISK_HIGH_THRESHOLD") {
            analytics.high_threshold = raw.parse().context("RISK_HIGH_THRESHOLD must be a float")?;
        }
        if let Ok(raw) = std::env::var("RISK_MEDIUM_THRESHOLD") {
            analytics.medium_threshold =
                raw.parse().context("RISK_MEDIUM_THRESHOLD must be a float")?;
        }
        if let Ok(raw) = std::env::var("NEGATIVITY_THRESHOLD") {
            analytics.negativity_threshold =
                raw.parse().context("NEGATIVITY_THRESHOLD must be a float")?;
        }
        if let Ok(raw) = std::env::var("SNAPSHOT_TTL_SECS") {
            analytics.snapshot_ttl =
                Duration::from_secs(raw.parse().context("SNAPSHOT_TTL_SECS must be an integer")?);
        }

        if !(analytics.alpha > 0.0 && analytics.alpha <= 1.0) {
            bail!("RISK_EWMA_ALPHA must be in (0, 1]");
        }
        if analytics.medium_threshold > analytics.high_threshold {
            bail!("RISK_MEDIUM_THRESHOLD must not exceed RISK_HIGH_THRESHOLD");
        }

        Ok(Self {
            database_url,
            bind_addr,
            session_key,
            analytics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = AnalyticsConfig::default();
        assert_eq!(cfg.high_threshold, 0.7);
        assert_eq!(cfg.medium_threshold, 0.4);
        assert_eq!(cfg.negativity_threshold, -0.2);
        assert!(cfg.alpha > 0.0 && cfg.alpha <= 1.0);
    }
}
