//! Backend selection at startup: durable when reachable, in-memory otherwise.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::QueueConfig;

use super::store::{BackendKind, InMemoryQueue, QueueBackend};

/// The backend chosen for this process lifetime.
#[derive(Clone)]
pub struct SelectedBackend {
    pub backend: Arc<dyn QueueBackend>,
    /// Why the durable backend was not used, when it wasn't.
    pub fallback_reason: Option<String>,
}

impl SelectedBackend {
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback_reason.is_some()
    }

    fn in_memory(reason: String) -> Self {
        warn!(
            reason = %reason,
            "durable queue unavailable, falling back to in-memory queue; jobs will not survive a restart"
        );
        Self {
            backend: InMemoryQueue::arc(),
            fallback_reason: Some(reason),
        }
    }
}

impl core::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("kind", &self.backend.kind())
            .field("fallback_reason", &self.fallback_reason)
            .finish()
    }
}

/// Try the durable backend once; fall back to in-memory on any failure.
///
/// Never fails. The decision is made once: no reconnection is attempted
/// later and a fallback is never upgraded.
#[cfg(feature = "redis")]
pub async fn select_backend(config: &QueueConfig) -> SelectedBackend {
    use super::redis_store::RedisQueue;

    match RedisQueue::connect(&config.redis_url, &config.queue_key, config.connect_timeout).await {
        Ok(queue) => {
            info!(key = %config.queue_key, "connected to durable queue");
            SelectedBackend {
                backend: Arc::new(queue),
                fallback_reason: None,
            }
        }
        Err(err) => SelectedBackend::in_memory(err.to_string()),
    }
}

#[cfg(not(feature = "redis"))]
pub async fn select_backend(config: &QueueConfig) -> SelectedBackend {
    let _ = config;
    let backend = SelectedBackend::in_memory("redis feature not enabled".to_string());
    info!("using in-memory queue");
    backend
}
