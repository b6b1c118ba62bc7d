//! Redis list-backed durable queue.
//!
//! Jobs are JSON-encoded and kept in a single list. `RPUSH` appends at the
//! tail and `LPOP` removes from the head, so the list reads oldest-first and
//! the queue is FIFO. Both command builders live here so the choice of ends
//! cannot drift apart.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument};

use reliefq_core::Job;

use super::store::{BackendError, BackendKind, QueueBackend};

/// Append to the tail of the list.
fn push_cmd(key: &str, payload: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("RPUSH");
    cmd.arg(key).arg(payload);
    cmd
}

/// Remove from the head of the list.
fn pop_cmd(key: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("LPOP");
    cmd.arg(key);
    cmd
}

fn len_cmd(key: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("LLEN");
    cmd.arg(key);
    cmd
}

fn op_error(op: &str, err: redis::RedisError) -> BackendError {
    BackendError::Operation(format!("{op} failed: {err}"))
}

/// Durable queue over a Redis list.
pub struct RedisQueue {
    key: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    /// Connect to Redis and verify the server answers `PING`.
    ///
    /// Every failure (bad URL, refused connection, auth error, timeout) is
    /// reported as [`BackendError::Unavailable`].
    #[instrument(skip_all, fields(key = %key.as_ref()))]
    pub async fn connect(
        url: &str,
        key: impl AsRef<str>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)
            .map_err(|e| BackendError::Unavailable(format!("invalid redis url: {e}")))?;

        let mut conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| BackendError::Unavailable(format!("connect timed out after {timeout:?}")))?
            .map_err(|e| BackendError::Unavailable(format!("connect failed: {e}")))?;

        let _pong: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| BackendError::Unavailable(format!("ping timed out after {timeout:?}")))?
            .map_err(|e| BackendError::Unavailable(format!("ping failed: {e}")))?;

        Ok(Self {
            key: key.as_ref().to_string(),
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// A handle to the shared connection, or `Closed`.
    fn connection(&self) -> Result<MultiplexedConnection, BackendError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| BackendError::Operation("redis connection lock poisoned".to_string()))?;
        guard.clone().ok_or(BackendError::Closed)
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn enqueue(&self, job: Job) -> Result<(), BackendError> {
        let payload = job.to_json().map_err(|e| BackendError::Encode(e.to_string()))?;
        let mut conn = self.connection()?;

        let _len: i64 = push_cmd(&self.key, &payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_error("RPUSH", e))?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>, BackendError> {
        let mut conn = self.connection()?;

        let raw: Option<String> = pop_cmd(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_error("LPOP", e))?;

        match raw {
            Some(raw) => Job::from_json(&raw)
                .map(Some)
                .map_err(|e| BackendError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, BackendError> {
        let mut conn = self.connection()?;
        len_cmd(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_error("LLEN", e))
    }

    async fn close(&self) -> Result<(), BackendError> {
        let taken = self
            .conn
            .lock()
            .map_err(|_| BackendError::Operation("redis connection lock poisoned".to_string()))?
            .take();

        if let Some(mut conn) = taken {
            // The server may drop the socket before replying; either way the
            // connection is released when `conn` goes out of scope.
            let quit: redis::RedisResult<String> = redis::cmd("QUIT").query_async(&mut conn).await;
            debug!(key = %self.key, ok = quit.is_ok(), "redis queue closed");
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }
}

impl core::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisQueue").field("key", &self.key).finish()
    }
}
