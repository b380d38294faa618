//! Broadcaster port
//!
//! Inbox lifecycle events fan out through this port. Implementations must not
//! block callers; the hub enforces that with bounded queues and a hand-off
//! timeout. A no-op implementation is a valid wiring.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("broadcaster is closed")]
    Closed,

    #[error("broadcast timed out")]
    Timeout,
}

/// One event to fan out. `user_id` filters delivery to a single user's
/// clients; `None` reaches everyone.
#[derive(Debug, Clone)]
pub struct BroadcastEvent {
    pub topic: String,
    pub user_id: Option<String>,
    pub payload: Value,
}

impl BroadcastEvent {
    pub fn for_user(topic: impl Into<String>, user_id: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            user_id: Some(user_id.into()),
            payload,
        }
    }
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError>;
}

/// Swallows every event.
#[derive(Debug, Default)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn broadcast(&self, _event: BroadcastEvent) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// Records events for inspection in tests.
#[derive(Debug, Default)]
pub struct CaptureBroadcaster {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl CaptureBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.topic.clone()).collect()
    }
}

#[async_trait]
impl Broadcaster for CaptureBroadcaster {
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError> {
        self.events.lock().push(event);
        Ok(())
    }
}
