//! Rendered messages and delivery attempts

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown message status: {}", s)),
        }
    }
}

/// One rendered unit destined for one recipient on one channel.
///
/// `channel` always holds the base channel; the provider that carried the
/// message is recorded on its delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub event_id: Uuid,
    pub channel: String,
    pub locale: String,
    pub subject: String,
    pub body: String,
    pub receiver: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(event_id: Uuid, channel: impl Into<String>, receiver: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            channel: channel.into(),
            locale: String::new(),
            subject: String::new(),
            body: String::new(),
            receiver: receiver.into(),
            status: MessageStatus::Pending,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A metadata string field, when present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)?.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transport invocation for one message via one provider. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub message_id: Uuid,
    /// Provider name of the messenger that handled the attempt
    pub adapter: String,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1-based attempt index, strictly monotonic per candidate
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn succeeded(message_id: Uuid, adapter: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id,
            adapter: adapter.into(),
            status: AttemptStatus::Succeeded,
            error: None,
            attempt,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        message_id: Uuid,
        adapter: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id,
            adapter: adapter.into(),
            status: AttemptStatus::Failed,
            error: Some(error.into()),
            attempt,
            created_at: Utc::now(),
        }
    }
}
