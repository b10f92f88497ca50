//! Background task scheduler for intervention reconciliation
//!
//! Settles `sent` nudges older than the abandonment window as purchased or
//! abandoned, for every active user. Enabled via environment variable:
//!
//! - `ANYA_RECONCILE_INTERVAL_MINUTES`: Interval in minutes (e.g., "60" for hourly)

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use anya_core::SessionOrchestrator;

/// Configuration for scheduled reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileScheduleConfig {
    /// Interval between runs in minutes
    pub interval_minutes: u64,
}

impl ReconcileScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (ANYA_RECONCILE_INTERVAL_MINUTES not set)
    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var("ANYA_RECONCILE_INTERVAL_MINUTES").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Option<Self> {
        let interval_minutes: u64 = value.and_then(|s| s.trim().parse().ok())?;

        if interval_minutes == 0 {
            warn!("ANYA_RECONCILE_INTERVAL_MINUTES is 0, automatic reconciliation disabled");
            return None;
        }

        Some(Self { interval_minutes })
    }
}

/// Start the reconcile scheduler as a background task
pub fn start_reconcile_scheduler(
    orchestrator: Arc<SessionOrchestrator>,
    config: ReconcileScheduleConfig,
) {
    info!(
        "Starting reconcile scheduler: every {} minutes",
        config.interval_minutes
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_minutes * 60));

        loop {
            ticker.tick().await;

            match orchestrator.reconcile_all(Utc::now()) {
                Ok(summary) if summary.checked > 0 => {
                    info!(
                        "Scheduled reconcile: {} checked, {} purchased, {} abandoned",
                        summary.checked, summary.purchased, summary.abandoned
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Scheduled reconcile failed: {}", e);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_set() {
        assert!(ReconcileScheduleConfig::parse(None).is_none());
    }

    #[test]
    fn test_config_zero_disables() {
        assert!(ReconcileScheduleConfig::parse(Some("0")).is_none());
    }

    #[test]
    fn test_config_parses_minutes() {
        let config = ReconcileScheduleConfig::parse(Some(" 15 ")).unwrap();
        assert_eq!(config.interval_minutes, 15);
        assert!(ReconcileScheduleConfig::parse(Some("hourly")).is_none());
    }
}
