//! Messenger port
//!
//! Concrete transport adapters (SMTP, Slack, Telegram, ...) live outside the
//! core and implement this trait. The engine selects them through the adapter
//! registry and hands them fully built [`OutboundMessage`]s.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::data::types::{Attachment, Message, Metadata};

#[derive(Error, Debug)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// What an adapter can carry.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub name: String,
    /// Channels the adapter serves (base names, e.g. `chat`, `email`)
    pub channels: Vec<String>,
    /// Body formats the adapter accepts (e.g. `text`, `html`, `markdown`)
    pub formats: Vec<String>,
    pub max_attachments: Option<usize>,
    pub metadata: Metadata,
}

/// The unit handed to an adapter for one delivery attempt.
///
/// `channel` is the base channel; `provider` is the chosen adapter's name.
/// `metadata` may carry a `secrets` entry; adapters use it to authenticate and
/// must never echo it back in errors.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub channel: String,
    pub provider: String,
    pub subject: String,
    pub body: String,
    pub to: String,
    pub attachments: Vec<Attachment>,
    pub metadata: Metadata,
    pub locale: String,
    pub headers: HashMap<String, String>,
}

impl OutboundMessage {
    /// Build the adapter message from a persisted message row.
    pub fn from_message(message: &Message, provider: impl Into<String>) -> Self {
        Self {
            id: message.id,
            channel: message.channel.clone(),
            provider: provider.into(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            to: message.receiver.clone(),
            attachments: Vec::new(),
            metadata: message.metadata.clone(),
            locale: message.locale.clone(),
            headers: HashMap::new(),
        }
    }
}

/// A transport adapter for one provider.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> Capabilities;
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}
