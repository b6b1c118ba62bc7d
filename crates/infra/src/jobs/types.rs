//! Loop-level job types: retry policy, dispatch outcomes, run statistics.

use serde::Serialize;

use reliefq_core::{JobId, JobStatus};

use super::dispatch::HandlerError;

/// Retry policy for jobs whose handler failed.
///
/// `max_retries = 0` (the default) means at-most-once, best effort: a failed
/// job is logged and dropped. With a positive value the orchestrator
/// re-enqueues the job at the tail until it has been retried that many times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self { max_retries: 0 }
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether a job that has already been retried `attempt` times gets
    /// another go.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// What happened to a dequeued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler returned successfully.
    Completed,
    /// Handler returned an error; the job is terminally processed.
    Failed(HandlerError),
    /// No handler registered for the job type; the job is dropped.
    UnknownType,
}

impl DispatchOutcome {
    /// Terminal status of the job this outcome belongs to.
    pub fn status(&self) -> JobStatus {
        match self {
            DispatchOutcome::Completed => JobStatus::Done,
            DispatchOutcome::Failed(_) | DispatchOutcome::UnknownType => JobStatus::Failed,
        }
    }
}

/// Result of a single loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// A job was dequeued and handed to the dispatcher.
    Dispatched {
        job_id: JobId,
        outcome: DispatchOutcome,
    },
    /// Nothing to do (empty queue, or a dequeue error treated as empty).
    Idle,
}

/// Counters accumulated over the lifetime of an orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub unknown_type: u64,
    pub retried: u64,
    pub dequeue_errors: u64,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: &DispatchOutcome) {
        self.dispatched += 1;
        match outcome {
            DispatchOutcome::Completed => self.completed += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
            DispatchOutcome::UnknownType => self.unknown_type += 1,
        }
    }
}
