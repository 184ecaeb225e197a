//! Configuration for the controller.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use mserve_api::WorkloadPhase;
use mserve_reconcile::BackoffPolicy;

use crate::controller::ControllerConfig;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Worker tasks per handler.
    pub workers: usize,

    /// Deadline for one reconcile invocation, in seconds.
    pub reconcile_timeout_secs: u64,

    /// Interval between full resyncs, in seconds.
    pub resync_interval_secs: u64,

    /// Delay before re-observing a pending workload, in seconds.
    pub poll_interval_secs: u64,

    /// First retry delay, in milliseconds.
    pub backoff_base_ms: u64,

    /// Retry delay cap, in seconds.
    pub backoff_max_secs: u64,

    /// JSON file of objects loaded into the store at startup.
    pub seed_file: Option<String>,

    /// Phase reported by the simulated workload driver.
    pub workload_phase: WorkloadPhase,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("MSERVE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let workload_phase = match std::env::var("MSERVE_WORKLOAD_PHASE") {
            Ok(raw) => raw
                .parse::<WorkloadPhase>()
                .map_err(|e| anyhow!("MSERVE_WORKLOAD_PHASE: {e}"))?,
            Err(_) => WorkloadPhase::Running,
        };

        Ok(Self {
            log_level,
            workers: env_or("MSERVE_WORKERS", 4usize).max(1),
            reconcile_timeout_secs: env_or("MSERVE_RECONCILE_TIMEOUT_SECS", 30u64).max(1),
            resync_interval_secs: env_or("MSERVE_RESYNC_INTERVAL_SECS", 300u64).max(1),
            poll_interval_secs: env_or("MSERVE_POLL_INTERVAL_SECS", 10u64).max(1),
            backoff_base_ms: env_or("MSERVE_BACKOFF_BASE_MS", 100),
            backoff_max_secs: env_or("MSERVE_BACKOFF_MAX_SECS", 30),
            seed_file: std::env::var("MSERVE_SEED_FILE").ok(),
            workload_phase,
        })
    }

    /// Runner settings derived from this configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs.max(1)),
            resync_interval: Duration::from_secs(self.resync_interval_secs.max(1)),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_secs(self.backoff_max_secs),
                ..BackoffPolicy::default()
            },
        }
    }

    /// Delay before a worker whose workload has not settled is looked at again.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Parses an environment variable, falling back to `default` when it is
/// unset or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            log_level: "debug".to_string(),
            workers: 2,
            reconcile_timeout_secs: 5,
            resync_interval_secs: 0,
            poll_interval_secs: 3,
            backoff_base_ms: 50,
            backoff_max_secs: 10,
            seed_file: None,
            workload_phase: WorkloadPhase::Pending,
        }
    }

    #[test]
    fn test_controller_config_conversion() {
        let controller = config().controller_config();
        assert_eq!(controller.workers, 2);
        assert_eq!(controller.reconcile_timeout, Duration::from_secs(5));
        assert_eq!(controller.resync_interval, Duration::from_secs(1));
        assert_eq!(controller.backoff.base, Duration::from_millis(50));
        assert_eq!(controller.backoff.max, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_durations_are_clamped() {
        let zeroed = Config {
            reconcile_timeout_secs: 0,
            poll_interval_secs: 0,
            ..config()
        };
        assert_eq!(
            zeroed.controller_config().reconcile_timeout,
            Duration::from_secs(1)
        );
        assert_eq!(zeroed.poll_interval(), Duration::from_secs(1));
        assert_eq!(config().poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("MSERVE_TEST_UNSET_VARIABLE", 7u64), 7);
    }
}
