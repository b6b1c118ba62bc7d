//! Process-wide wiring: the selected backend and the handles built on it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{OrchestratorConfig, QueueConfig};
use crate::jobs::{
    BackendKind, Dispatcher, JobQueue, Orchestrator, QueueBackend, SelectedBackend, select_backend,
};

/// Owns the backend for the life of the process.
///
/// Producers get [`JobQueue`] handles, the consumer gets an [`Orchestrator`];
/// both share the same backend.
#[derive(Clone)]
pub struct WorkerContext {
    backend: Arc<dyn QueueBackend>,
    fallback_reason: Option<String>,
}

impl WorkerContext {
    /// Select the backend (durable if reachable) and build the context.
    pub async fn initialize(config: &QueueConfig) -> Self {
        let SelectedBackend {
            backend,
            fallback_reason,
        } = select_backend(config).await;

        info!(
            backend = %backend.kind(),
            degraded = fallback_reason.is_some(),
            "worker context initialized"
        );
        Self {
            backend,
            fallback_reason,
        }
    }

    /// Wrap an already-constructed backend.
    pub fn from_backend(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            fallback_reason: None,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// True when running on the in-memory fallback because the durable
    /// backend was unreachable.
    pub fn is_degraded(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn queue(&self) -> JobQueue {
        JobQueue::new(self.backend.clone())
    }

    pub fn orchestrator(&self, dispatcher: Dispatcher, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(self.backend.clone(), dispatcher, config)
    }

    /// Close the backend. Safe to call after the orchestrator already did.
    pub async fn shutdown(self) {
        if let Err(err) = self.backend.close().await {
            warn!(error = %err, "failed to close queue backend");
        }
    }
}

impl core::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("backend", &self.backend.kind())
            .field("fallback_reason", &self.fallback_reason)
            .finish()
    }
}
