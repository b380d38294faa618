//! Engine entity types
//!
//! Statuses are string-typed on the wire; enums here serialize to the exact
//! vocabulary storage and external consumers expect.

pub mod attachment;
pub mod channel;
pub mod definition;
pub mod event;
pub mod inbox;
pub mod message;
pub mod preference;
pub mod template;

pub use attachment::{Attachment, normalize_attachments};
pub use channel::ChannelAddress;
pub use definition::Definition;
pub use event::{Event, EventStatus};
pub use inbox::InboxItem;
pub use message::{AttemptStatus, DeliveryAttempt, Message, MessageStatus};
pub use preference::{Preference, QuietHours, SubscriptionGroup};
pub use template::Template;

/// Free-form metadata carried by entities and adapter messages.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
