//! Per-job payload assembly
//!
//! A dispatch job is one `(channel, recipient)` cell of the fan-out product.
//! The render payload starts from the event context and gains the recipient,
//! channel, provider, and definition metadata; per-channel context overrides
//! are applied last.

use serde_json::Value;

use crate::data::types::{
    Attachment, ChannelAddress, Definition, Event, Message, Metadata, normalize_attachments,
};

/// Message metadata keys a channel override may replace.
const OVERRIDE_METADATA_KEYS: [&str; 6] =
    ["html_body", "text_body", "action_url", "icon", "badge", "cta_label"];

/// One `(channel, recipient)` unit of work.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub channel: ChannelAddress,
    pub template_code: String,
    pub recipient: String,
    /// Locale requested by dispatch options; empty falls back to the event
    /// context and then the renderer default
    pub locale: String,
}

impl DispatchJob {
    /// Label for error sinks and logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.channel.route(), self.recipient)
    }
}

/// The per-channel override object from `context.channel_overrides`, if any.
pub fn channel_overrides<'a>(event: &'a Event, base: &str) -> Option<&'a Metadata> {
    event
        .context
        .get("channel_overrides")?
        .as_object()?
        .get(base)?
        .as_object()
}

/// Build the renderer payload for a job.
pub fn build_payload(event: &Event, definition: &Definition, job: &DispatchJob) -> Metadata {
    let mut payload = event.context.clone();
    payload.insert("recipient".into(), job.recipient.clone().into());
    payload.insert("channel".into(), job.channel.base.clone().into());
    payload.insert(
        "provider".into(),
        job.channel.provider.clone().unwrap_or_default().into(),
    );
    payload.insert(
        "definition".into(),
        Value::Object(definition.metadata.clone()),
    );
    if let Some(overrides) = channel_overrides(event, &job.channel.base) {
        for (key, value) in overrides {
            payload.insert(key.clone(), value.clone());
        }
    }
    payload
}

/// Attachments for a job: the per-channel set from
/// `context.channel_attachments` when present, else `context.attachments`.
pub fn extract_attachments(event: &Event, base: &str) -> Vec<Attachment> {
    let per_channel = event
        .context
        .get("channel_attachments")
        .and_then(|v| v.as_object())
        .and_then(|m| m.get(base));
    match per_channel {
        Some(raw) => normalize_attachments(raw),
        None => event
            .context
            .get("attachments")
            .map(normalize_attachments)
            .unwrap_or_default(),
    }
}

/// Overlay channel overrides onto a freshly created message: `subject` and
/// `body` replace the rendered values, the remaining keys land in metadata.
pub fn apply_overrides(message: &mut Message, overrides: &Metadata) {
    if let Some(subject) = overrides.get("subject").and_then(Value::as_str) {
        message.subject = subject.to_string();
    }
    if let Some(body) = overrides.get("body").and_then(Value::as_str) {
        message.body = body.to_string();
    }
    for key in OVERRIDE_METADATA_KEYS {
        if let Some(value) = overrides.get(key) {
            message.metadata.insert(key.to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn event_with_context(context: Value) -> Event {
        let mut event = Event::new("welcome", vec!["bob".into()]);
        event.context = context.as_object().unwrap().clone();
        event
    }

    fn job(channel: &str) -> DispatchJob {
        DispatchJob {
            channel: ChannelAddress::parse(channel),
            template_code: "welcome".into(),
            recipient: "bob".into(),
            locale: String::new(),
        }
    }

    #[test]
    fn test_payload_injects_routing_fields() {
        let event = event_with_context(json!({"plan": "pro"}));
        let mut definition = Definition::new("welcome", "Welcome", vec!["chat".into()]);
        definition.metadata.insert("severity".into(), "info".into());

        let payload = build_payload(&event, &definition, &job("chat:slack"));
        assert_eq!(payload["plan"], "pro");
        assert_eq!(payload["recipient"], "bob");
        assert_eq!(payload["channel"], "chat");
        assert_eq!(payload["provider"], "slack");
        assert_eq!(payload["definition"]["severity"], "info");
    }

    #[test]
    fn test_payload_empty_provider() {
        let event = event_with_context(json!({}));
        let definition = Definition::new("welcome", "Welcome", vec!["chat".into()]);
        let payload = build_payload(&event, &definition, &job("chat"));
        assert_eq!(payload["provider"], "");
    }

    #[test]
    fn test_channel_overrides_reach_payload() {
        let event = event_with_context(json!({
            "cta_label": "Open",
            "channel_overrides": {"email": {"cta_label": "Open in browser", "action_url": "https://x"}}
        }));
        let definition = Definition::new("welcome", "Welcome", vec!["email".into()]);
        let payload = build_payload(&event, &definition, &job("email"));
        assert_eq!(payload["cta_label"], "Open in browser");
        assert_eq!(payload["action_url"], "https://x");

        // Other channels keep the base value
        let payload = build_payload(&event, &definition, &job("sms"));
        assert_eq!(payload["cta_label"], "Open");
    }

    #[test]
    fn test_extract_attachments_per_channel_wins() {
        let event = event_with_context(json!({
            "attachments": [{"filename": "a.txt", "content": "aa"}],
            "channel_attachments": {"email": [{"filename": "b.pdf", "url": "https://files/b.pdf"}]}
        }));
        let email = extract_attachments(&event, "email");
        assert_eq!(email.len(), 1);
        assert_eq!(email[0].filename, "b.pdf");

        let chat = extract_attachments(&event, "chat");
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].filename, "a.txt");
    }

    #[test]
    fn test_apply_overrides_to_message() {
        let mut message = Message::new(Uuid::new_v4(), "email", "bob");
        message.subject = "Rendered subject".into();
        let overrides = json!({
            "subject": "Overridden",
            "html_body": "<b>hi</b>",
            "icon": "bell",
            "unrelated": "ignored"
        });
        apply_overrides(&mut message, overrides.as_object().unwrap());
        assert_eq!(message.subject, "Overridden");
        assert_eq!(message.metadata["html_body"], "<b>hi</b>");
        assert_eq!(message.metadata["icon"], "bell");
        assert!(!message.metadata.contains_key("unrelated"));
    }
}
