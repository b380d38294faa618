//! Deferred work queue port
//!
//! The engine hands scheduled and digest work to a queue and expects the
//! runner to call back into the intake service at `run_at`. The
//! implementation is external; [`NoopQueue`] serves disabled scheduling and
//! [`CaptureQueue`] records jobs for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// A deferred unit of work.
///
/// `key` is an idempotency hint for the queue implementation: scheduled events
/// use `event:<code>:<unix>`, digests use `digest:<batch_key>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub key: String,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, job: QueueJob) -> Result<(), QueueError>;
}

/// Discards every job. Used when scheduling is disabled.
#[derive(Debug, Default)]
pub struct NoopQueue;

#[async_trait]
impl Queue for NoopQueue {
    async fn enqueue(&self, job: QueueJob) -> Result<(), QueueError> {
        tracing::debug!(key = %job.key, "Dropping job on no-op queue");
        Ok(())
    }
}

/// Records enqueued jobs for inspection.
#[derive(Debug, Default)]
pub struct CaptureQueue {
    jobs: Mutex<Vec<QueueJob>>,
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl Queue for CaptureQueue {
    async fn enqueue(&self, job: QueueJob) -> Result<(), QueueError> {
        self.jobs.lock().push(job);
        Ok(())
    }
}
