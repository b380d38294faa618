//! Channel- and locale-specific template sources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// Template identity is `(code, locale, channel)`.
///
/// The engine stores templates and hands their codes to the renderer port; the
/// interpolation syntax is the renderer's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub code: String,
    pub locale: String,
    pub channel: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub format: String,
    /// Required/optional placeholder names the renderer validates against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TemplateSchema>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSchema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl Template {
    pub fn new(
        code: impl Into<String>,
        locale: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            code: code.into(),
            locale: locale.into(),
            channel: channel.into(),
            subject: String::new(),
            body: String::new(),
            format: String::new(),
            schema: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
