//! Infrastructure layer: queue backends, job dispatch, the polling loop and
//! process configuration.

pub mod config;
pub mod context;
pub mod jobs;

pub use config::{OrchestratorConfig, QueueConfig, WorkerConfig};
pub use context::WorkerContext;
