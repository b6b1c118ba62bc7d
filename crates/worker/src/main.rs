use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reliefq_infra::jobs::{Dispatcher, RunSummary, register_builtin};
use reliefq_infra::{WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }
    reliefq_observability::init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        queue_key = %config.queue.queue_key,
        idle_interval_ms = config.orchestrator.idle_interval.as_millis() as u64,
        max_retries = config.orchestrator.retry.max_retries,
        "starting job worker"
    );

    let ctx = WorkerContext::initialize(&config.queue).await;
    if let Some(reason) = ctx.fallback_reason() {
        tracing::warn!(reason, "running on in-memory queue; queued jobs are lost on exit");
    }

    let mut dispatcher = Dispatcher::new();
    register_builtin(&mut dispatcher).context("failed to register job handlers")?;

    let shutdown = CancellationToken::new();
    let orchestrator = ctx.orchestrator(dispatcher, config.orchestrator);
    let loop_handle = tokio::spawn(orchestrator.run(shutdown.clone()));

    let signal = shutdown_signal().await;
    shutdown.cancel();

    let summary = join_and_shutdown(loop_handle, ctx).await?;
    tracing::info!(completed = summary.completed, failed = summary.failed, "job worker stopped");

    signal
}

/// Wait for the loop task, then close the backend whether or not it panicked.
async fn join_and_shutdown(
    handle: JoinHandle<RunSummary>,
    ctx: WorkerContext,
) -> anyhow::Result<RunSummary> {
    let joined = handle.await;
    ctx.shutdown().await;
    joined.context("orchestrator task panicked")
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to install Ctrl-C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        res = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
            res
        }
        res = terminate => {
            tracing::info!("received SIGTERM, shutting down");
            res
        }
    }
}
