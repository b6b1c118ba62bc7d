//! Queue backend abstraction, the in-memory backend and the producer handle.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use reliefq_core::{Job, JobType};

/// Which kind of backend is serving the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// External, persistent store (Redis).
    Durable,
    /// Process-local fallback.
    InMemory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Durable => "durable",
            BackendKind::InMemory => "in_memory",
        }
    }
}

impl core::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue backend error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The durable backend could not be established.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// An operation on an established backend failed.
    #[error("backend operation failed: {0}")]
    Operation(String),
    #[error("failed to encode job: {0}")]
    Encode(String),
    #[error("failed to decode job: {0}")]
    Decode(String),
    /// The backend was closed; no further operations are accepted.
    #[error("backend is closed")]
    Closed,
}

/// Ordered job storage.
///
/// Implementations keep FIFO order: `dequeue` returns the oldest job that
/// `enqueue` appended. Both calls must be safe to use concurrently.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a job to the tail of the queue.
    async fn enqueue(&self, job: Job) -> Result<(), BackendError>;

    /// Remove and return the job at the head, or `None` when empty.
    ///
    /// Never waits for work to arrive.
    async fn dequeue(&self) -> Result<Option<Job>, BackendError>;

    /// Number of jobs currently queued.
    async fn len(&self) -> Result<usize, BackendError>;

    /// Release held resources. Calling it again is a no-op.
    async fn close(&self) -> Result<(), BackendError>;

    fn kind(&self) -> BackendKind;
}

#[async_trait]
impl<B> QueueBackend for Arc<B>
where
    B: QueueBackend + ?Sized,
{
    async fn enqueue(&self, job: Job) -> Result<(), BackendError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(&self) -> Result<Option<Job>, BackendError> {
        (**self).dequeue().await
    }

    async fn len(&self) -> Result<usize, BackendError> {
        (**self).len().await
    }

    async fn close(&self) -> Result<(), BackendError> {
        (**self).close().await
    }

    fn kind(&self) -> BackendKind {
        (**self).kind()
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// In-memory queue used when the durable backend is unavailable (and in
/// tests).
///
/// Not shared across processes. Jobs still queued when the backend is closed
/// are discarded.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<InMemoryState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut InMemoryState) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BackendError::Operation("in-memory queue lock poisoned".to_string()))?;
        f(&mut state)
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), BackendError> {
        self.with_state(|state| {
            if state.closed {
                return Err(BackendError::Closed);
            }
            state.jobs.push_back(job);
            Ok(())
        })
    }

    async fn dequeue(&self) -> Result<Option<Job>, BackendError> {
        self.with_state(|state| {
            if state.closed {
                return Err(BackendError::Closed);
            }
            Ok(state.jobs.pop_front())
        })
    }

    async fn len(&self) -> Result<usize, BackendError> {
        self.with_state(|state| Ok(state.jobs.len()))
    }

    async fn close(&self) -> Result<(), BackendError> {
        let discarded = self.with_state(|state| {
            if state.closed {
                return Ok(0);
            }
            state.closed = true;
            let discarded = state.jobs.len();
            state.jobs.clear();
            Ok(discarded)
        })?;

        if discarded > 0 {
            warn!(discarded, "in-memory queue closed with jobs still queued");
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }
}

/// Producer-facing handle to the active backend.
///
/// Cheap to clone; hand one to every component that needs to enqueue work.
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Create a job and append it to the queue.
    ///
    /// Returns as soon as the backend accepted the job; processing happens
    /// later and its failures are only visible in logs.
    pub async fn enqueue(&self, job_type: JobType, payload: JsonValue) -> Result<Job, BackendError> {
        let job = Job::new(job_type, payload);
        self.backend.enqueue(job.clone()).await?;
        info!(
            job_id = %job.id(),
            job_type = %job.job_type(),
            backend = %self.backend.kind(),
            "job added"
        );
        Ok(job)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub async fn len(&self) -> Result<usize, BackendError> {
        self.backend.len().await
    }
}

impl core::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobQueue")
            .field("backend", &self.backend.kind())
            .finish()
    }
}
