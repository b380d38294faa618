//! Message attachments

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constants::DEFAULT_ATTACHMENT_CONTENT_TYPE;

/// An attachment carried either inline (`content`) or by reference (`url`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    /// Inline content; adapters or the attachment resolver may turn this into
    /// a URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub size: usize,
}

impl Attachment {
    pub fn inline(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn by_url(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.url.as_deref().is_none_or(str::is_empty)
    }
}

/// Normalize raw attachment entries from an event context.
///
/// Entries with neither content nor URL are dropped; a missing content type
/// gets the octet-stream default and a missing size is filled from the inline
/// content length.
pub fn normalize_attachments(raw: &Value) -> Vec<Attachment> {
    let Some(entries) = raw.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<Attachment>(entry.clone()).ok())
        .filter(|att| !att.is_empty())
        .map(|mut att| {
            if att.content_type.is_empty() {
                att.content_type = DEFAULT_ATTACHMENT_CONTENT_TYPE.to_string();
            }
            if att.size == 0
                && let Some(content) = &att.content
            {
                att.size = content.len();
            }
            att
        })
        .collect()
}
