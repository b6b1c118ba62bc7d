//! Background job queue and orchestration.
//!
//! ## Components
//!
//! - `QueueBackend`: FIFO job storage. `RedisQueue` (durable, behind the
//!   `redis` feature) or `InMemoryQueue` (process-local fallback)
//! - `select_backend`: picks the backend once at startup
//! - `JobQueue`: producer handle for enqueueing work
//! - `Dispatcher`: routes a job to the handler registered for its type
//! - `Orchestrator`: the single polling consumer
//!
//! Delivery is at-most-once unless a `RetryPolicy` is configured. Jobs
//! have no persisted status transitions; outcomes are only visible in logs.

pub mod dispatch;
pub mod executor;
pub mod handlers;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod selector;
pub mod store;
pub mod types;

pub use dispatch::{DispatchError, Dispatcher, FnHandler, HandlerError, JobHandler, decode_payload};
pub use executor::{LoopState, Orchestrator};
pub use handlers::{
    DonationPayload, NotificationPayload, ProcessDonationHandler, SendNotificationHandler,
    register_builtin,
};
#[cfg(feature = "redis")]
pub use redis_store::RedisQueue;
pub use selector::{SelectedBackend, select_backend};
pub use store::{BackendError, BackendKind, InMemoryQueue, JobQueue, QueueBackend};
pub use types::{DispatchOutcome, RetryPolicy, RunSummary, Tick};
