//! Intake events

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Metadata;

/// Lifecycle status of an [`Event`]. Transitions are monotonic except that a
/// retry may reset status within a single dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Scheduled,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown event status: {}", s)),
        }
    }
}

/// A single submission of intent to notify, fanned out into per-recipient and
/// per-channel messages by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub definition_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Ordered recipient identifiers; never empty
    pub recipients: Vec<String>,
    #[serde(default)]
    pub context: Metadata,
    pub scheduled_at: DateTime<Utc>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(definition_code: impl Into<String>, recipients: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            definition_code: definition_code.into(),
            tenant_id: None,
            actor_id: None,
            recipients,
            context: Metadata::new(),
            scheduled_at: now,
            status: EventStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The `locale` context field, when present.
    pub fn context_locale(&self) -> Option<&str> {
        self.context.get("locale")?.as_str()
    }
}
