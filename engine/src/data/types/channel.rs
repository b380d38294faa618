//! Logical channel addresses
//!
//! A logical channel string is `"<base>"` or `"<base>:<provider>"`. The raw
//! form only crosses component boundaries; inside the engine it is parsed into
//! a [`ChannelAddress`] once and carried in structured form.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::constants::INBOX_CHANNEL_ALIASES;

static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*(:[a-z][a-z0-9_-]*)?$").unwrap());

/// A parsed `base[:provider]` channel address, normalized to lowercase.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelAddress {
    pub base: String,
    pub provider: Option<String>,
}

impl ChannelAddress {
    /// Split a logical channel string on the first `:`, trimming and
    /// lowercasing both sides. An empty provider segment is dropped.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.split_once(':') {
            Some((base, provider)) => {
                let provider = provider.trim();
                Self {
                    base: base.trim().to_string(),
                    provider: (!provider.is_empty()).then(|| provider.to_string()),
                }
            }
            None => Self {
                base: normalized,
                provider: None,
            },
        }
    }

    /// Whether a raw channel string matches the channel grammar.
    pub fn is_valid(raw: &str) -> bool {
        CHANNEL_RE.is_match(&raw.trim().to_ascii_lowercase())
    }

    /// Whether the base channel routes to the inbox service.
    pub fn is_inbox(&self) -> bool {
        INBOX_CHANNEL_ALIASES.contains(&self.base.as_str())
    }

    /// The qualified route string, `base` or `base:provider`.
    pub fn route(&self) -> String {
        match &self.provider {
            Some(provider) => format!("{}:{}", self.base, provider),
            None => self.base.clone(),
        }
    }

    /// The same base with a different provider qualifier.
    pub fn with_provider(&self, provider: impl Into<String>) -> Self {
        Self {
            base: self.base.clone(),
            provider: Some(provider.into()),
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.route())
    }
}
