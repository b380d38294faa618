//! Dispatch pipeline
//!
//! Fans an event out across the cartesian product of channels and recipients
//! with a bounded worker pool. Each job gates on recipient policy, renders,
//! persists a message, and routes it to the inbox or through messenger
//! candidates with bounded retries. Job failures are collected and reported
//! as one aggregate error; the event status reflects the overall outcome.

pub mod deliver;
mod error;
pub mod job;

pub use error::DispatchError;
pub use job::DispatchJob;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::config::DispatcherConfig;
use crate::data::repos::{AttemptRepo, DefinitionRepo, EventRepo, MessageRepo};
use crate::data::secrets::{SecretManager, delivery_references};
use crate::data::types::{
    Attachment, ChannelAddress, Definition, Event, EventStatus, Message, MessageStatus,
};
use crate::domain::inbox::InboxService;
use crate::domain::messenger::{Messenger, OutboundMessage};
use crate::domain::preferences::{EvaluateRequest, PreferenceResolver, ScopeRef};
use crate::domain::registry::AdapterRegistry;
use crate::domain::render::{RenderRequest, TemplateRenderer};
use crate::utils::strings::normalize_string_list;

use job::{apply_overrides, build_payload, channel_overrides, extract_attachments};

/// Context handed to an attachment resolver for one candidate delivery.
#[derive(Debug, Clone)]
pub struct AttachmentContext {
    pub channel: String,
    pub provider: String,
    pub recipient: String,
    pub event_id: Uuid,
    pub definition_code: String,
}

/// Transforms attachments before they reach an adapter, e.g. uploading inline
/// content and replacing it with URLs.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(
        &self,
        context: &AttachmentContext,
        attachments: Vec<Attachment>,
    ) -> Result<Vec<Attachment>, anyhow::Error>;
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Channel list override; `None` uses the definition's channels
    pub channels: Option<Vec<String>>,
    /// Locale override carried into every job
    pub locale: Option<String>,
}

/// Constructor dependencies.
pub struct DispatcherPorts {
    pub definitions: Arc<dyn DefinitionRepo>,
    pub events: Arc<dyn EventRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub attempts: Arc<dyn AttemptRepo>,
    pub registry: Arc<AdapterRegistry>,
    pub preferences: Arc<PreferenceResolver>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub inbox: Arc<InboxService>,
    pub secrets: Option<SecretManager>,
    pub attachment_resolver: Option<Arc<dyn AttachmentResolver>>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    ports: DispatcherPorts,
}

struct RunState {
    event: Event,
    definition: Definition,
    cancel: CancellationToken,
    errors: Mutex<Vec<String>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, ports: DispatcherPorts) -> Self {
        Self { config, ports }
    }

    /// Fan out one event. Returns an aggregate error when any job failed;
    /// per-job outcomes are visible on message and attempt rows either way.
    pub async fn dispatch(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        event: &Event,
        options: DispatchOptions,
    ) -> Result<(), DispatchError> {
        let definition = self
            .ports
            .definitions
            .get_by_code(&event.definition_code)
            .await?
            .ok_or_else(|| DispatchError::DefinitionNotFound(event.definition_code.clone()))?;

        let channels = options
            .channels
            .filter(|channels| !channels.is_empty())
            .unwrap_or_else(|| definition.channels.clone());
        if channels.is_empty() {
            return Err(DispatchError::Validation("no channels to dispatch".into()));
        }
        if event.recipients.is_empty() {
            return Err(DispatchError::Validation("no recipients to dispatch".into()));
        }

        let locale = options.locale.unwrap_or_default();
        let mut jobs = Vec::with_capacity(channels.len() * event.recipients.len());
        for channel in &channels {
            let address = ChannelAddress::parse(channel);
            let template_code = definition.template_code(&address.base).to_string();
            for recipient in &event.recipients {
                jobs.push(DispatchJob {
                    channel: address.clone(),
                    template_code: template_code.clone(),
                    recipient: recipient.clone(),
                    locale: locale.clone(),
                });
            }
        }

        let total = jobs.len();
        let run = Arc::new(RunState {
            event: event.clone(),
            definition,
            cancel: cancel.clone(),
            errors: Mutex::new(Vec::new()),
        });

        let worker_count = self.config.max_workers.max(1).min(total);
        let (tx, rx) = mpsc::channel::<DispatchJob>(total);
        for job in jobs {
            // Capacity equals the job count, so feeding never blocks
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let dispatcher = Arc::clone(self);
            let run = Arc::clone(&run);
            let rx = Arc::clone(&rx);
            workers.spawn(async move {
                loop {
                    if run.cancel.is_cancelled() {
                        break;
                    }
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    if let Err(e) = dispatcher.process_job(&run, &job).await {
                        if e.is_cancelled() {
                            break;
                        }
                        run.errors.lock().push(format!("{}: {}", job.label(), e));
                    }
                }
            });
        }
        while workers.join_next().await.is_some() {}

        if cancel.is_cancelled() {
            self.ports
                .events
                .update_status(event.id, EventStatus::Failed)
                .await?;
            return Err(DispatchError::Cancelled);
        }

        let errors = std::mem::take(&mut *run.errors.lock());
        let status = if errors.is_empty() {
            EventStatus::Processed
        } else {
            EventStatus::Failed
        };
        self.ports.events.update_status(event.id, status).await?;

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                event_id = %event.id,
                failed = errors.len(),
                total,
                "Dispatch finished with failed jobs"
            );
            Err(DispatchError::Aggregate {
                failed: errors.len(),
                total,
                first: errors.into_iter().next().unwrap_or_default(),
            })
        }
    }

    async fn process_job(&self, run: &RunState, job: &DispatchJob) -> Result<(), DispatchError> {
        let event = &run.event;
        let base = job.channel.base.clone();

        let render_locale = if !job.locale.is_empty() {
            job.locale.clone()
        } else {
            event.context_locale().unwrap_or_default().to_string()
        };

        // Policy gate
        let mut scopes = vec![ScopeRef::user(job.recipient.clone())];
        if let Some(tenant) = &event.tenant_id {
            scopes.push(ScopeRef::tenant(tenant.clone()));
        }
        scopes.push(ScopeRef::system());
        let subscriptions = event
            .context
            .get("subscriptions")
            .map(normalize_string_list)
            .unwrap_or_default();
        let evaluation = self
            .ports
            .preferences
            .evaluate(&EvaluateRequest {
                definition_code: event.definition_code.clone(),
                channel: base.clone(),
                scopes,
                subscriptions,
                timestamp: None,
                default_enabled: run.definition.default_enabled(),
            })
            .await?;
        if !evaluation.allowed {
            tracing::debug!(
                event_id = %event.id,
                channel = %base,
                recipient = %job.recipient,
                reason = %evaluation.reason,
                "Delivery skipped by preference policy"
            );
            return Ok(());
        }

        // Render
        let payload = build_payload(event, &run.definition, job);
        let rendered = self
            .ports
            .renderer
            .render(RenderRequest {
                code: job.template_code.clone(),
                channel: base.clone(),
                locale: render_locale.clone(),
                data: payload,
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    event_id = %event.id,
                    template = %job.template_code,
                    channel = %base,
                    error = %e,
                    "Template rendering failed"
                );
            })?;

        // Persist the message row
        let mut message = Message::new(event.id, &base, &job.recipient);
        message.locale = if rendered.locale.is_empty() {
            render_locale
        } else {
            rendered.locale.clone()
        };
        message.subject = rendered.subject;
        message.body = rendered.body;
        message.metadata = rendered.metadata;
        if let Some(overrides) = channel_overrides(event, &base) {
            apply_overrides(&mut message, overrides);
        }
        self.ports.messages.create(&message).await?;

        if job.channel.is_inbox() {
            return self.deliver_inbox(run, message).await;
        }

        // Route: a preference override restricts candidates to that provider
        let route = match &evaluation.provider {
            Some(provider) => job.channel.with_provider(provider.clone()),
            None => job.channel.clone(),
        };
        let candidates = self.ports.registry.candidates(&route);
        if candidates.is_empty() {
            self.finish_failed(&mut message).await?;
            return Err(DispatchError::AdapterNotFound(route.route()));
        }

        let mut last_error: Option<DispatchError> = None;
        for candidate in candidates {
            match self.deliver_candidate(run, job, &message, &candidate).await {
                Ok(attempt) => {
                    message.status = MessageStatus::Delivered;
                    self.ports.messages.update(&message).await?;
                    tracing::debug!(
                        event_id = %event.id,
                        message_id = %message.id,
                        adapter = candidate.name(),
                        attempt,
                        "Message delivered"
                    );
                    return Ok(());
                }
                Err(e) if e.is_cancelled() => {
                    self.finish_failed(&mut message).await?;
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(
                        message_id = %message.id,
                        adapter = candidate.name(),
                        error = %e,
                        "Messenger candidate failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        self.finish_failed(&mut message).await?;
        Err(last_error.unwrap_or_else(|| DispatchError::AdapterNotFound(route.route())))
    }

    async fn deliver_inbox(
        &self,
        run: &RunState,
        mut message: Message,
    ) -> Result<(), DispatchError> {
        self.ports
            .inbox
            .deliver_from_message(&message)
            .await
            .map_err(|e| DispatchError::Inbox(e.to_string()))?;
        message.status = MessageStatus::Delivered;
        self.ports.messages.update(&message).await?;
        tracing::debug!(
            event_id = %run.event.id,
            message_id = %message.id,
            recipient = %message.receiver,
            "Inbox item delivered"
        );
        Ok(())
    }

    /// One candidate: resolve attachments and secrets, build the adapter
    /// message, and run the retry loop. The message row is a copy per
    /// candidate so adapter state never bleeds between tries.
    async fn deliver_candidate(
        &self,
        run: &RunState,
        job: &DispatchJob,
        message: &Message,
        candidate: &Arc<dyn Messenger>,
    ) -> Result<u32, DispatchError> {
        let event = &run.event;
        let provider = candidate.name().to_string();
        let mut outbound = OutboundMessage::from_message(message, &provider);
        outbound
            .metadata
            .insert("event_id".into(), event.id.to_string().into());
        outbound
            .metadata
            .insert("definition_code".into(), event.definition_code.clone().into());
        outbound
            .metadata
            .insert("recipient_id".into(), job.recipient.clone().into());
        outbound
            .metadata
            .insert("recipient_locale".into(), message.locale.clone().into());

        // Attachments, optionally transformed by the resolver
        let attachments = extract_attachments(event, &job.channel.base);
        outbound.attachments = match &self.ports.attachment_resolver {
            Some(resolver) => {
                let context = AttachmentContext {
                    channel: job.channel.base.clone(),
                    provider: provider.clone(),
                    recipient: job.recipient.clone(),
                    event_id: event.id,
                    definition_code: event.definition_code.clone(),
                };
                resolver
                    .resolve(&context, attachments)
                    .await
                    .map_err(|e| DispatchError::Attachments(e.to_string()))?
            }
            None => attachments,
        };

        // Scoped secrets: user, then tenant, then system; first hit wins
        let references = delivery_references(
            &job.recipient,
            event.tenant_id.as_deref(),
            &job.channel.base,
            &provider,
        );
        let resolved = match &self.ports.secrets {
            Some(manager) => {
                manager
                    .resolve_first(&references)
                    .await
                    .map_err(|e| DispatchError::SecretResolution {
                        route: format!("{}:{}", job.channel.base, provider),
                        message: e.to_string(),
                    })?
            }
            None => None,
        };
        match resolved {
            Some((reference, value)) => {
                tracing::debug!(
                    message_id = %message.id,
                    reference = %reference,
                    value = %value.masked(),
                    "Resolved delivery secret"
                );
                let mut secrets = crate::data::types::Metadata::new();
                secrets.insert(reference.key.clone(), value.as_str().into_owned().into());
                outbound.metadata.insert("secrets".into(), Value::Object(secrets));
            }
            None => {
                if !self
                    .config
                    .allows_env_fallback(&job.recipient, event.tenant_id.as_deref())
                {
                    return Err(DispatchError::SecretResolution {
                        route: format!("{}:{}", job.channel.base, provider),
                        message: "no scoped secret and fallback not allowed".into(),
                    });
                }
                // Allowlisted: the adapter falls back to its own defaults
            }
        }

        deliver::deliver_with_retries(
            &self.ports.attempts,
            candidate,
            message.id,
            &outbound,
            self.config.max_retries,
            self.config.retry_base_delay(),
            &run.cancel,
        )
        .await
    }

    async fn finish_failed(&self, message: &mut Message) -> Result<(), DispatchError> {
        message.status = MessageStatus::Failed;
        self.ports.messages.update(message).await?;
        tracing::warn!(
            message_id = %message.id,
            channel = %message.channel,
            recipient = %message.receiver,
            "Message failed on every candidate"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repos::memory::{
        MemoryAttemptRepo, MemoryDefinitionRepo, MemoryEventRepo, MemoryInboxRepo,
        MemoryMessageRepo, MemoryPreferenceRepo,
    };
    use crate::data::repos::{InboxRepo, PreferenceRepo};
    use crate::data::secrets::SecretReference;
    use crate::data::types::{AttemptStatus, Metadata, Preference};
    use crate::domain::messenger::{Capabilities, SendError};
    use crate::domain::realtime::{Broadcaster, CaptureBroadcaster};
    use crate::domain::render::{RenderError, Rendered};
    use serde_json::json;

    struct RecordingMessenger {
        name: String,
        channels: Vec<String>,
        sends: Mutex<Vec<OutboundMessage>>,
        fail_always: bool,
    }

    impl RecordingMessenger {
        fn new(name: &str, channels: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                channels: channels.iter().map(|c| c.to_string()).collect(),
                sends: Mutex::new(Vec::new()),
                fail_always: false,
            })
        }

        fn failing(name: &str, channels: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                channels: channels.iter().map(|c| c.to_string()).collect(),
                sends: Mutex::new(Vec::new()),
                fail_always: true,
            })
        }

        fn sends(&self) -> Vec<OutboundMessage> {
            self.sends.lock().clone()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                name: self.name.clone(),
                channels: self.channels.clone(),
                ..Default::default()
            }
        }

        async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
            self.sends.lock().push(message.clone());
            if self.fail_always {
                Err(SendError::Transport("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    struct EchoRenderer;

    #[async_trait]
    impl TemplateRenderer for EchoRenderer {
        async fn render(&self, request: RenderRequest) -> Result<Rendered, RenderError> {
            if request.code == "missing_template" {
                return Err(RenderError::NotFound(request.code));
            }
            let recipient = request
                .data
                .get("recipient")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(Rendered {
                subject: format!("subject:{}", request.code),
                body: format!("hello {recipient}"),
                metadata: Metadata::new(),
                locale: request.locale,
            })
        }
    }

    struct TestEnv {
        dispatcher: Arc<Dispatcher>,
        definitions: Arc<MemoryDefinitionRepo>,
        events: Arc<MemoryEventRepo>,
        messages: Arc<MemoryMessageRepo>,
        attempts: Arc<MemoryAttemptRepo>,
        preferences: Arc<MemoryPreferenceRepo>,
        inbox_repo: Arc<MemoryInboxRepo>,
        registry: Arc<AdapterRegistry>,
        broadcaster: Arc<CaptureBroadcaster>,
        secrets: SecretManager,
    }

    fn env_with_config(config: DispatcherConfig) -> TestEnv {
        let definitions = Arc::new(MemoryDefinitionRepo::new());
        let events = Arc::new(MemoryEventRepo::new());
        let messages = Arc::new(MemoryMessageRepo::new());
        let attempts = Arc::new(MemoryAttemptRepo::new());
        let preferences = Arc::new(MemoryPreferenceRepo::new());
        let inbox_repo = Arc::new(MemoryInboxRepo::new());
        let registry = Arc::new(AdapterRegistry::new());
        let broadcaster = Arc::new(CaptureBroadcaster::new());
        let secrets = SecretManager::encrypted_memory(&[3u8; 32], None);

        let inbox = Arc::new(InboxService::new(
            Arc::clone(&inbox_repo) as Arc<dyn InboxRepo>,
            Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        ));
        let resolver = Arc::new(PreferenceResolver::new(
            Arc::clone(&preferences) as Arc<dyn PreferenceRepo>,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            config,
            DispatcherPorts {
                definitions: Arc::clone(&definitions) as Arc<dyn DefinitionRepo>,
                events: Arc::clone(&events) as Arc<dyn EventRepo>,
                messages: Arc::clone(&messages) as Arc<dyn MessageRepo>,
                attempts: Arc::clone(&attempts) as Arc<dyn AttemptRepo>,
                registry: Arc::clone(&registry),
                preferences: resolver,
                renderer: Arc::new(EchoRenderer),
                inbox,
                secrets: Some(secrets.clone()),
                attachment_resolver: None,
            },
        ));

        TestEnv {
            dispatcher,
            definitions,
            events,
            messages,
            attempts,
            preferences,
            inbox_repo,
            registry,
            broadcaster,
            secrets,
        }
    }

    fn env() -> TestEnv {
        env_with_config(DispatcherConfig {
            retry_base_delay_ms: 1,
            ..Default::default()
        })
    }

    impl TestEnv {
        async fn seed_definition(&self, code: &str, channels: &[&str]) {
            let definition = Definition::new(
                code,
                code,
                channels.iter().map(|c| c.to_string()).collect(),
            );
            self.definitions.create(&definition).await.unwrap();
        }

        async fn seed_event(&self, code: &str, recipients: &[&str]) -> Event {
            let event = Event::new(code, recipients.iter().map(|r| r.to_string()).collect());
            self.events.create(&event).await.unwrap();
            event
        }

        async fn seed_system_secret(&self, channel: &str, provider: &str, value: &[u8]) {
            self.secrets
                .put(
                    &SecretReference::system("default", channel, provider, "default"),
                    value,
                )
                .await
                .unwrap();
        }

        async fn seed_preference(
            &self,
            subject_type: &str,
            subject_id: &str,
            code: &str,
            channel: &str,
            patch: impl FnOnce(&mut Preference),
        ) {
            let mut preference = Preference::new(subject_type, subject_id, code, channel);
            patch(&mut preference);
            self.preferences.upsert(&preference).await.unwrap();
        }

        async fn dispatch(&self, event: &Event) -> Result<(), DispatchError> {
            self.dispatcher
                .dispatch(&CancellationToken::new(), event, DispatchOptions::default())
                .await
        }
    }

    #[tokio::test]
    async fn test_provider_override_routes_per_recipient() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat", "slack"]);
        let telegram = RecordingMessenger::new("telegram", &["chat", "telegram"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);
        env.registry.register(Arc::clone(&telegram) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"xoxb-system").await;
        env.seed_system_secret("chat", "telegram", b"tg-system").await;

        env.seed_definition("deploy", &["chat"]).await;
        env.seed_preference("user", "bob", "deploy", "chat", |p| {
            p.additional_rules = json!({"channels": {"chat": {"provider": "slack"}}})
                .as_object()
                .unwrap()
                .clone();
        })
        .await;
        env.seed_preference("user", "carlos", "deploy", "chat", |p| {
            p.additional_rules = json!({"channels": {"chat": {"provider": "telegram"}}})
                .as_object()
                .unwrap()
                .clone();
        })
        .await;

        let event = env.seed_event("deploy", &["bob", "carlos"]).await;
        env.dispatch(&event).await.unwrap();

        let slack_sends = slack.sends();
        let telegram_sends = telegram.sends();
        assert_eq!(slack_sends.len(), 1);
        assert_eq!(slack_sends[0].to, "bob");
        assert_eq!(telegram_sends.len(), 1);
        assert_eq!(telegram_sends[0].to, "carlos");

        // Each message's attempt names the adapter that carried it
        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        for message in &messages {
            assert_eq!(message.status, MessageStatus::Delivered);
            assert_eq!(message.channel, "chat");
            let attempts = env.attempts.list_by_message(message.id).await.unwrap();
            assert_eq!(attempts.len(), 1);
            let expected = if message.receiver == "bob" { "slack" } else { "telegram" };
            assert_eq!(attempts[0].adapter, expected);
            assert_eq!(attempts[0].status, AttemptStatus::Succeeded);
        }

        let stored = env.events.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_scoped_secret_resolution_prefers_user() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat", "slack"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);

        env.seed_system_secret("chat", "slack", b"xoxb-system").await;
        env.secrets
            .put(&SecretReference::user("bob", "chat", "slack", "token"), b"xoxb-bob")
            .await
            .unwrap();
        env.secrets
            .put(&SecretReference::user("bob", "chat", "slack", "default"), b"xoxb-bob")
            .await
            .unwrap();

        env.seed_definition("deploy", &["chat:slack"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;
        env.dispatch(&event).await.unwrap();

        let sends = slack.sends();
        assert_eq!(sends.len(), 1);
        let secrets = sends[0].metadata.get("secrets").unwrap().as_object().unwrap();
        assert_eq!(secrets.get("default").unwrap(), "xoxb-bob");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_records_attempts_and_fails() {
        let env = env();
        let broken = RecordingMessenger::failing("slack", &["chat", "slack"]);
        env.registry.register(Arc::clone(&broken) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"xoxb-system").await;

        env.seed_definition("deploy", &["chat"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;

        let err = env.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Aggregate { failed: 1, total: 1, .. }));

        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Failed);

        let attempts = env.attempts.list_by_message(messages[0].id).await.unwrap();
        assert_eq!(attempts.len(), 3);
        let indices: Vec<u32> = attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(attempts.iter().all(|a| a.status == AttemptStatus::Failed));

        let stored = env.events.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
    }

    #[tokio::test]
    async fn test_opt_out_skips_without_message() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"xoxb-system").await;

        env.seed_definition("deploy", &["chat"]).await;
        env.seed_preference("user", "bob", "deploy", "chat", |p| p.enabled = Some(false))
            .await;

        let event = env.seed_event("deploy", &["bob"]).await;
        env.dispatch(&event).await.unwrap();

        assert!(slack.sends().is_empty());
        assert!(env.messages.list_by_event(event.id).await.unwrap().is_empty());
        let stored = env.events.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_inbox_channel_routes_to_inbox_service() {
        let env = env();
        env.seed_definition("deploy", &["in-app"]).await;
        let event = env.seed_event("deploy", &["u1"]).await;
        env.dispatch(&event).await.unwrap();

        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Delivered);
        assert_eq!(messages[0].channel, "in-app");

        let (items, _) = env
            .inbox_repo
            .list_by_user("u1", crate::data::repos::Paging::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id, Some(messages[0].id));
        assert_eq!(env.broadcaster.topics(), vec!["inbox.created"]);
        // No messenger attempts for inbox deliveries
        assert!(env.attempts.list_by_message(messages[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_not_found_fails_job() {
        let env = env();
        env.seed_definition("deploy", &["sms"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;

        let err = env.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Aggregate { .. }));

        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_secret_without_fallback_fails() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);

        env.seed_definition("deploy", &["chat"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;

        let err = env.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Aggregate { .. }));
        assert!(slack.sends().is_empty());
    }

    #[tokio::test]
    async fn test_allowlisted_recipient_delivers_without_secrets() {
        let env = env_with_config(DispatcherConfig {
            retry_base_delay_ms: 1,
            env_fallback_allowlist: vec!["bob".into()],
            ..Default::default()
        });
        let slack = RecordingMessenger::new("slack", &["chat"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);

        env.seed_definition("deploy", &["chat"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;
        env.dispatch(&event).await.unwrap();

        let sends = slack.sends();
        assert_eq!(sends.len(), 1);
        assert!(!sends[0].metadata.contains_key("secrets"));
    }

    #[tokio::test]
    async fn test_second_candidate_wins_after_first_exhausts() {
        let env = env();
        let broken = RecordingMessenger::failing("primary", &["chat"]);
        let backup = RecordingMessenger::new("backup", &["chat"]);
        env.registry.register(Arc::clone(&broken) as Arc<dyn Messenger>);
        env.registry.register(Arc::clone(&backup) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "primary", b"p-token").await;
        env.seed_system_secret("chat", "backup", b"b-token").await;

        env.seed_definition("deploy", &["chat"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;
        env.dispatch(&event).await.unwrap();

        assert_eq!(broken.sends().len(), 3);
        assert_eq!(backup.sends().len(), 1);

        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages[0].status, MessageStatus::Delivered);
        let attempts = env.attempts.list_by_message(messages[0].id).await.unwrap();
        // Three failed attempts on the first candidate, one success on the second
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[3].adapter, "backup");
        assert_eq!(attempts[3].status, AttemptStatus::Succeeded);
        assert_eq!(attempts[3].attempt, 1);
    }

    #[tokio::test]
    async fn test_fan_out_product() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat"]);
        let smtp = RecordingMessenger::new("smtp", &["email"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);
        env.registry.register(Arc::clone(&smtp) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"s").await;
        env.seed_system_secret("email", "smtp", b"m").await;

        env.seed_definition("deploy", &["chat", "email"]).await;
        let event = env.seed_event("deploy", &["u1", "u2", "u3"]).await;
        env.dispatch(&event).await.unwrap();

        assert_eq!(slack.sends().len(), 3);
        assert_eq!(smtp.sends().len(), 3);
        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 6);
        assert!(messages.iter().all(|m| m.status == MessageStatus::Delivered));
    }

    #[tokio::test]
    async fn test_render_failure_fails_job_but_not_siblings() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"s").await;

        // One channel renders, the other's template is missing
        let mut definition = Definition::new("deploy", "Deploy", vec!["chat".into(), "sms".into()]);
        definition
            .template_keys
            .insert("sms".into(), "missing_template".into());
        env.definitions.create(&definition).await.unwrap();

        let event = env.seed_event("deploy", &["bob"]).await;
        let err = env.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, DispatchError::Aggregate { failed: 1, total: 2, .. }));

        // The chat job still delivered
        assert_eq!(slack.sends().len(), 1);
        let messages = env.messages.list_by_event(event.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, "chat");
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_reports_once() {
        let env = env();
        env.seed_definition("deploy", &["chat"]).await;
        let event = env.seed_event("deploy", &["u1", "u2", "u3"]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = env
            .dispatcher
            .dispatch(&cancel, &event, DispatchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        let stored = env.events.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
    }

    #[tokio::test]
    async fn test_channel_option_overrides_definition() {
        let env = env();
        let slack = RecordingMessenger::new("slack", &["chat"]);
        env.registry.register(Arc::clone(&slack) as Arc<dyn Messenger>);
        env.seed_system_secret("chat", "slack", b"s").await;

        env.seed_definition("deploy", &["email"]).await;
        let event = env.seed_event("deploy", &["bob"]).await;
        env.dispatcher
            .dispatch(
                &CancellationToken::new(),
                &event,
                DispatchOptions {
                    channels: Some(vec!["chat".into()]),
                    locale: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(slack.sends().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_definition_fails_fast() {
        let env = env();
        let event = Event::new("ghost", vec!["bob".into()]);
        let err = env.dispatch(&event).await.unwrap_err();
        assert!(matches!(err, DispatchError::DefinitionNotFound(_)));
    }
}
