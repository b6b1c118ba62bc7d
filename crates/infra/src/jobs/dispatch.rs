//! Job type routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use reliefq_core::{Job, JobType};

use super::types::DispatchOutcome;

/// Error returned by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The payload does not have the shape the handler expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The handler refused or failed to carry out the work.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl HandlerError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Dispatcher error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("duplicate handler for job type: {0}")]
    DuplicateHandler(JobType),
    #[error("unknown job type: {0}")]
    UnknownJobType(JobType),
}

/// Handler for one job type.
///
/// Handlers may have external side effects but never touch the queue; the
/// orchestrator owns every queue interaction.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

/// Adapter turning a plain function into a [`JobHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        (self.f)(job)
    }
}

/// Decode a job payload into the handler's typed input.
pub fn decode_payload<T: DeserializeOwned>(job: &Job) -> Result<T, HandlerError> {
    serde_json::from_value(job.payload().clone())
        .map_err(|e| HandlerError::invalid_payload(format!("{} payload: {e}", job.job_type())))
}

/// Routing table from job type to handler.
///
/// Built during startup (mutable), then moved into the orchestrator and used
/// read-only.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a job type. One handler per type.
    pub fn register(
        &mut self,
        job_type: JobType,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), DispatchError> {
        if self.handlers.contains_key(&job_type) {
            return Err(DispatchError::DuplicateHandler(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    /// Register a plain function as the handler for a job type.
    pub fn register_fn<F>(&mut self, job_type: JobType, f: F) -> Result<(), DispatchError>
    where
        F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(job_type, Arc::new(FnHandler::new(f)))
    }

    pub fn handler_for(&self, job_type: &JobType) -> Result<&Arc<dyn JobHandler>, DispatchError> {
        self.handlers
            .get(job_type)
            .ok_or_else(|| DispatchError::UnknownJobType(job_type.clone()))
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `job`.
    ///
    /// Never fails: unknown types and handler errors are logged and reported
    /// through the returned outcome.
    pub async fn dispatch(&self, job: &Job) -> DispatchOutcome {
        let handler = match self.handler_for(job.job_type()) {
            Ok(handler) => handler,
            Err(err) => {
                error!(
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    error = %err,
                    "no handler for job; dropping"
                );
                return DispatchOutcome::UnknownType;
            }
        };

        match handler.handle(job).await {
            Ok(()) => {
                debug!(job_id = %job.id(), job_type = %job.job_type(), "job handler succeeded");
                DispatchOutcome::Completed
            }
            Err(err) => {
                warn!(
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    attempt = job.attempt(),
                    error = %err,
                    "job handler failed"
                );
                DispatchOutcome::Failed(err)
            }
        }
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("job_types", &self.registered_types())
            .finish()
    }
}
