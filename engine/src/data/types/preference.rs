//! Recipient preferences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// A quiet-hours window in `HH:MM` wall-clock strings.
///
/// `end <= start` spans midnight. The timezone is an IANA name; an absent or
/// unparsable value falls back to UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Scoped recipient policy.
///
/// Identity is `(subject_type, subject_id, definition_code, channel)`; at most
/// one live row exists per tuple. Soft-deleted by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    /// Scope of the subject: `user`, `tenant`, or `system`
    pub subject_type: String,
    pub subject_id: String,
    pub definition_code: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    /// Free rules map: `subscriptions`, `provider`,
    /// `channels.<ch>.{enabled,provider}`
    #[serde(default)]
    pub additional_rules: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Preference {
    pub fn new(
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
        definition_code: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            definition_code: definition_code.into(),
            channel: channel.into(),
            enabled: None,
            locale: None,
            quiet_hours: None,
            additional_rules: Metadata::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Subscription groups carry metadata only; membership is evaluated from the
/// request context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionGroup {
    pub code: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionGroup {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }
}
