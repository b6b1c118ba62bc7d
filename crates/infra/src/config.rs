//! Environment-driven configuration.
//!
//! | Variable                   | Default                  |
//! |----------------------------|--------------------------|
//! | `REDIS_URL`                | `redis://localhost:6379` |
//! | `JOB_QUEUE_KEY`            | `jobs`                   |
//! | `REDIS_CONNECT_TIMEOUT_MS` | `2000`                   |
//! | `JOB_POLL_INTERVAL_MS`     | `5000`                   |
//! | `JOB_MAX_RETRIES`          | `0`                      |
//!
//! Unset or empty variables take the default. Unparseable numbers are logged
//! and also take the default; configuration never aborts startup.

use std::time::Duration;

use tracing::warn;

use crate::jobs::RetryPolicy;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_QUEUE_KEY: &str = "jobs";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(5_000);

/// How to reach the durable backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub redis_url: String,
    pub queue_key: String,
    /// Upper bound on connect + initial ping.
    pub connect_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Sleep between polls when the queue is empty.
    pub idle_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything the worker process needs at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    pub queue: QueueConfig,
    pub orchestrator: OrchestratorConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let queue = QueueConfig {
            redis_url: var("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            queue_key: var("JOB_QUEUE_KEY").unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string()),
            connect_timeout: millis(
                "REDIS_CONNECT_TIMEOUT_MS",
                var("REDIS_CONNECT_TIMEOUT_MS"),
                DEFAULT_CONNECT_TIMEOUT,
            ),
        };

        let orchestrator = OrchestratorConfig {
            idle_interval: millis(
                "JOB_POLL_INTERVAL_MS",
                var("JOB_POLL_INTERVAL_MS"),
                DEFAULT_IDLE_INTERVAL,
            ),
            retry: RetryPolicy::with_max_retries(number("JOB_MAX_RETRIES", var("JOB_MAX_RETRIES"), 0)),
        };

        Self { queue, orchestrator }
    }
}

fn number<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + core::fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default = %default, "invalid number; using default");
            default
        }),
    }
}

fn millis(name: &str, raw: Option<String>, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(number(name, raw, default_ms))
}
