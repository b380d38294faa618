//! Notification definitions

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// A named notification type with channel routing and template mapping.
///
/// Identity is `code`. Immutable once created except via explicit update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub category: String,
    /// Ordered logical channel names (`base` or `base:provider`)
    pub channels: Vec<String>,
    /// Map of base channel to template code
    #[serde(default)]
    pub template_keys: HashMap<String, String>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional policy blob; `default_enabled` feeds the preference resolver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Definition {
    pub fn new(code: impl Into<String>, name: impl Into<String>, channels: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            code: code.into(),
            name: name.into(),
            severity: String::new(),
            category: String::new(),
            channels,
            template_keys: HashMap::new(),
            metadata: Metadata::new(),
            policy: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Template code for a base channel, falling back to the definition code.
    pub fn template_code(&self, base_channel: &str) -> &str {
        self.template_keys
            .get(base_channel)
            .map(String::as_str)
            .unwrap_or(&self.code)
    }

    /// `policy.default_enabled`, when the definition carries one.
    pub fn default_enabled(&self) -> Option<bool> {
        self.policy.as_ref()?.get("default_enabled")?.as_bool()
    }
}
