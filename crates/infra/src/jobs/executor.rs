//! The polling loop: dequeue one job, dispatch it, repeat.
//!
//! While jobs keep arriving the loop drains them back to back, yielding to the
//! runtime between jobs. When the queue is empty (or the backend reports an
//! error) it sleeps for the idle interval. Cancellation is observed before
//! each poll and during the idle sleep; a handler that is already running is
//! allowed to finish.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reliefq_core::JobStatus;

use crate::config::OrchestratorConfig;

use super::dispatch::Dispatcher;
use super::store::QueueBackend;
use super::types::{DispatchOutcome, RunSummary, Tick};

/// Where the loop is between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Queue looked empty last time; the next poll follows an idle sleep.
    Polling,
    /// Last poll produced a job; poll again right away.
    Draining,
}

/// Single consumer of the queue.
pub struct Orchestrator {
    backend: Arc<dyn QueueBackend>,
    dispatcher: Dispatcher,
    config: OrchestratorConfig,
    state: LoopState,
    summary: RunSummary,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        dispatcher: Dispatcher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            config,
            state: LoopState::Polling,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// One iteration: at most one dequeue and one dispatch.
    ///
    /// Backend errors are logged and reported as [`Tick::Idle`] so the loop
    /// keeps running.
    pub async fn poll_once(&mut self) -> Tick {
        let job = match self.backend.dequeue().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.state = LoopState::Polling;
                return Tick::Idle;
            }
            Err(err) => {
                warn!(error = %err, backend = %self.backend.kind(), "dequeue failed; treating queue as empty");
                self.summary.dequeue_errors += 1;
                self.state = LoopState::Polling;
                return Tick::Idle;
            }
        };

        self.state = LoopState::Draining;
        info!(
            job_id = %job.id(),
            job_type = %job.job_type(),
            attempt = job.attempt(),
            status = %JobStatus::Processing,
            "processing job"
        );

        let outcome = self.dispatcher.dispatch(&job).await;
        self.summary.record(&outcome);
        info!(
            job_id = %job.id(),
            job_type = %job.job_type(),
            status = %outcome.status(),
            "job finished"
        );

        if matches!(outcome, DispatchOutcome::Failed(_))
            && self.config.retry.should_retry(job.attempt())
        {
            let retry = job.next_attempt();
            match self.backend.enqueue(retry).await {
                Ok(()) => {
                    self.summary.retried += 1;
                    info!(
                        job_id = %job.id(),
                        next_attempt = job.attempt() + 1,
                        max_retries = self.config.retry.max_retries,
                        "job re-enqueued for retry"
                    );
                }
                Err(err) => {
                    warn!(job_id = %job.id(), error = %err, "failed to re-enqueue job; dropping");
                }
            }
        }

        Tick::Dispatched {
            job_id: job.id().clone(),
            outcome,
        }
    }

    /// Poll until `shutdown` is cancelled, then close the backend.
    pub async fn run(mut self, shutdown: CancellationToken) -> RunSummary {
        info!(
            backend = %self.backend.kind(),
            idle_interval_ms = self.config.idle_interval.as_millis() as u64,
            max_retries = self.config.retry.max_retries,
            job_types = ?self.dispatcher.registered_types(),
            "orchestrator started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                Tick::Dispatched { .. } => tokio::task::yield_now().await,
                Tick::Idle => {
                    debug!(sleep_ms = self.config.idle_interval.as_millis() as u64, "queue idle");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_interval) => {}
                    }
                }
            }
        }

        if let Err(err) = self.backend.close().await {
            warn!(error = %err, "failed to close queue backend");
        }

        let summary = self.summary;
        info!(
            dispatched = summary.dispatched,
            completed = summary.completed,
            failed = summary.failed,
            unknown_type = summary.unknown_type,
            retried = summary.retried,
            dequeue_errors = summary.dequeue_errors,
            "orchestrator stopped"
        );
        summary
    }
}

impl core::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.kind())
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::dispatch::HandlerError;
    use crate::jobs::handlers::register_builtin;
    use crate::jobs::store::{BackendError, BackendKind, InMemoryQueue};
    use crate::jobs::types::RetryPolicy;
    use async_trait::async_trait;
    use reliefq_core::{Job, JobType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn builtin_dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        register_builtin(&mut dispatcher).unwrap();
        dispatcher
    }

    fn config(retry: RetryPolicy) -> OrchestratorConfig {
        OrchestratorConfig {
            idle_interval: Duration::from_millis(10),
            retry,
        }
    }

    #[tokio::test]
    async fn drains_jobs_in_order_then_goes_idle() {
        let backend = InMemoryQueue::arc();
        let notify = Job::new(JobType::send_notification(), json!({"message": "hi"}));
        let donate = Job::new(
            JobType::process_donation(),
            json!({"amount": 10, "currency": "USD"}),
        );
        backend.enqueue(notify.clone()).await.unwrap();
        backend.enqueue(donate.clone()).await.unwrap();

        let mut orchestrator =
            Orchestrator::new(backend, builtin_dispatcher(), OrchestratorConfig::default());

        assert_eq!(
            orchestrator.poll_once().await,
            Tick::Dispatched {
                job_id: notify.id().clone(),
                outcome: DispatchOutcome::Completed
            }
        );
        assert_eq!(orchestrator.state(), LoopState::Draining);
        assert_eq!(
            orchestrator.poll_once().await,
            Tick::Dispatched {
                job_id: donate.id().clone(),
                outcome: DispatchOutcome::Completed
            }
        );
        assert_eq!(orchestrator.poll_once().await, Tick::Idle);
        assert_eq!(orchestrator.state(), LoopState::Polling);
        assert_eq!(orchestrator.summary().completed, 2);
    }

    #[tokio::test]
    async fn unknown_type_does_not_stop_the_loop() {
        let backend = InMemoryQueue::arc();
        backend
            .enqueue(Job::new(JobType::new("mystery").unwrap(), json!({})))
            .await
            .unwrap();
        backend
            .enqueue(Job::new(JobType::send_notification(), json!({"message": "after"})))
            .await
            .unwrap();

        let mut orchestrator =
            Orchestrator::new(backend, builtin_dispatcher(), config(RetryPolicy::none()));

        assert!(matches!(
            orchestrator.poll_once().await,
            Tick::Dispatched { outcome: DispatchOutcome::UnknownType, .. }
        ));
        assert!(matches!(
            orchestrator.poll_once().await,
            Tick::Dispatched { outcome: DispatchOutcome::Completed, .. }
        ));
        assert_eq!(orchestrator.summary().unknown_type, 1);
    }

    fn failing_dispatcher(calls: Arc<AtomicUsize>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register_fn(JobType::new("flaky").unwrap(), move |_job| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::rejected("downstream unavailable"))
            })
            .unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn failed_job_is_dropped_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = InMemoryQueue::arc();
        backend
            .enqueue(Job::new(JobType::new("flaky").unwrap(), json!({})))
            .await
            .unwrap();

        let mut orchestrator = Orchestrator::new(
            backend.clone(),
            failing_dispatcher(calls.clone()),
            config(RetryPolicy::default()),
        );

        assert!(matches!(
            orchestrator.poll_once().await,
            Tick::Dispatched { outcome: DispatchOutcome::Failed(_), .. }
        ));
        assert_eq!(orchestrator.poll_once().await, Tick::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.summary().retried, 0);
    }

    #[tokio::test]
    async fn failed_job_is_retried_up_to_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = InMemoryQueue::arc();
        let job = Job::new(JobType::new("flaky").unwrap(), json!({}));
        backend.enqueue(job.clone()).await.unwrap();

        let mut orchestrator = Orchestrator::new(
            backend.clone(),
            failing_dispatcher(calls.clone()),
            config(RetryPolicy::with_max_retries(1)),
        );

        // First attempt fails and is re-enqueued under the same id.
        let first = orchestrator.poll_once().await;
        assert!(matches!(first, Tick::Dispatched { ref job_id, .. } if job_id == job.id()));
        assert_eq!(backend.len().await.unwrap(), 1);

        // The retry fails too and is dropped.
        let second = orchestrator.poll_once().await;
        assert!(matches!(second, Tick::Dispatched { ref job_id, .. } if job_id == job.id()));
        assert_eq!(orchestrator.poll_once().await, Tick::Idle);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.summary().retried, 1);
        assert_eq!(orchestrator.summary().failed, 2);
    }

    /// Backend whose dequeue always errors.
    struct BrokenBackend;

    #[async_trait]
    impl QueueBackend for BrokenBackend {
        async fn enqueue(&self, _job: Job) -> Result<(), BackendError> {
            Err(BackendError::Operation("connection reset".to_string()))
        }

        async fn dequeue(&self) -> Result<Option<Job>, BackendError> {
            Err(BackendError::Operation("connection reset".to_string()))
        }

        async fn len(&self) -> Result<usize, BackendError> {
            Ok(0)
        }

        async fn close(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Durable
        }
    }

    #[tokio::test]
    async fn dequeue_error_is_treated_as_empty() {
        let mut orchestrator = Orchestrator::new(
            Arc::new(BrokenBackend),
            builtin_dispatcher(),
            config(RetryPolicy::none()),
        );

        assert_eq!(orchestrator.poll_once().await, Tick::Idle);
        assert_eq!(orchestrator.poll_once().await, Tick::Idle);
        assert_eq!(orchestrator.summary().dequeue_errors, 2);
    }

    #[tokio::test]
    async fn cancellation_interrupts_idle_sleep_and_closes_backend() {
        let backend = InMemoryQueue::arc();
        let orchestrator = Orchestrator::new(
            backend.clone(),
            builtin_dispatcher(),
            OrchestratorConfig {
                idle_interval: Duration::from_secs(60),
                retry: RetryPolicy::none(),
            },
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(orchestrator.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop did not stop within the idle interval")
            .unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(
            backend.enqueue(Job::new(JobType::send_notification(), json!({}))).await,
            Err(BackendError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_waits_a_full_interval_before_polling_again() {
        let backend = InMemoryQueue::arc();
        let orchestrator = Orchestrator::new(
            backend.clone(),
            builtin_dispatcher(),
            OrchestratorConfig {
                idle_interval: Duration::from_secs(5),
                retry: RetryPolicy::none(),
            },
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(orchestrator.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        backend
            .enqueue(Job::new(JobType::send_notification(), json!({"message": "late"})))
            .await
            .unwrap();

        // Still inside the first idle sleep (t = 4s).
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.len().await.unwrap(), 1);

        // Next poll at t = 5s picks it up.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.len().await.unwrap(), 0);

        shutdown.cancel();
        let summary = task.await.unwrap();
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn run_processes_jobs_enqueued_while_running() {
        let backend = InMemoryQueue::arc();
        let orchestrator = Orchestrator::new(
            backend.clone(),
            builtin_dispatcher(),
            config(RetryPolicy::none()),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(orchestrator.run(shutdown.clone()));

        for i in 0..3 {
            backend
                .enqueue(Job::new(
                    JobType::send_notification(),
                    json!({"message": format!("n{i}")}),
                ))
                .await
                .unwrap();
        }

        // The loop drains within a few idle intervals.
        for _ in 0..100 {
            if backend.len().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();

        let summary = task.await.unwrap();
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_polls() {
        let backend = InMemoryQueue::arc();
        backend
            .enqueue(Job::new(JobType::send_notification(), json!({"message": "left"})))
            .await
            .unwrap();
        let orchestrator =
            Orchestrator::new(backend, builtin_dispatcher(), config(RetryPolicy::none()));

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = orchestrator.run(shutdown).await;
        assert_eq!(summary.dispatched, 0);
    }
}
