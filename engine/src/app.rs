//! Engine composition
//!
//! Wires repositories, the adapter registry, preference resolution, the inbox,
//! the dispatcher, and intake into one constructed object. Defaults are
//! in-memory and no-op so an embedded engine works with nothing but a
//! renderer; production wiring swaps in real ports. There is no global state;
//! everything hangs off the built [`Engine`].

use std::sync::Arc;

use crate::core::config::EngineConfig;
use crate::data::queue::{NoopQueue, Queue};
use crate::data::repos::memory::{
    MemoryAttemptRepo, MemoryDefinitionRepo, MemoryEventRepo, MemoryInboxRepo, MemoryMessageRepo,
    MemoryPreferenceRepo, MemorySubscriptionGroupRepo, MemoryTemplateRepo,
};
use crate::data::repos::{
    AttemptRepo, DefinitionRepo, EventRepo, InboxRepo, MessageRepo, PreferenceRepo,
    SubscriptionGroupRepo, TemplateRepo,
};
use crate::data::secrets::SecretManager;
use crate::domain::dispatch::{AttachmentResolver, Dispatcher, DispatcherPorts};
use crate::domain::inbox::InboxService;
use crate::domain::intake::IntakeService;
use crate::domain::preferences::PreferenceResolver;
use crate::domain::realtime::{Broadcaster, NoopBroadcaster};
use crate::domain::registry::AdapterRegistry;
use crate::domain::render::TemplateRenderer;

/// Repository handles shared by the services and exposed for embedding.
#[derive(Clone)]
pub struct Repositories {
    pub definitions: Arc<dyn DefinitionRepo>,
    pub templates: Arc<dyn TemplateRepo>,
    pub events: Arc<dyn EventRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub attempts: Arc<dyn AttemptRepo>,
    pub preferences: Arc<dyn PreferenceRepo>,
    pub subscription_groups: Arc<dyn SubscriptionGroupRepo>,
    pub inbox: Arc<dyn InboxRepo>,
}

impl Repositories {
    /// All-in-memory repositories.
    pub fn memory() -> Self {
        Self {
            definitions: Arc::new(MemoryDefinitionRepo::new()),
            templates: Arc::new(MemoryTemplateRepo::new()),
            events: Arc::new(MemoryEventRepo::new()),
            messages: Arc::new(MemoryMessageRepo::new()),
            attempts: Arc::new(MemoryAttemptRepo::new()),
            preferences: Arc::new(MemoryPreferenceRepo::new()),
            subscription_groups: Arc::new(MemorySubscriptionGroupRepo::new()),
            inbox: Arc::new(MemoryInboxRepo::new()),
        }
    }
}

pub struct Engine {
    pub config: EngineConfig,
    pub repos: Repositories,
    pub registry: Arc<AdapterRegistry>,
    pub preferences: Arc<PreferenceResolver>,
    pub inbox: Arc<InboxService>,
    pub dispatcher: Arc<Dispatcher>,
    pub intake: Arc<IntakeService>,
    pub secrets: Option<SecretManager>,
}

impl Engine {
    pub fn builder(renderer: Arc<dyn TemplateRenderer>) -> EngineBuilder {
        EngineBuilder::new(renderer)
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    renderer: Arc<dyn TemplateRenderer>,
    repos: Option<Repositories>,
    queue: Arc<dyn Queue>,
    broadcaster: Arc<dyn Broadcaster>,
    secrets: Option<SecretManager>,
    attachment_resolver: Option<Arc<dyn AttachmentResolver>>,
}

impl EngineBuilder {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            config: EngineConfig::default(),
            renderer,
            repos: None,
            queue: Arc::new(NoopQueue),
            broadcaster: Arc::new(NoopBroadcaster),
            secrets: None,
            attachment_resolver: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repositories(mut self, repos: Repositories) -> Self {
        self.repos = Some(repos);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn secrets(mut self, secrets: SecretManager) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn attachment_resolver(mut self, resolver: Arc<dyn AttachmentResolver>) -> Self {
        self.attachment_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Engine {
        let repos = self.repos.unwrap_or_else(Repositories::memory);
        let registry = Arc::new(AdapterRegistry::new());
        let preferences = Arc::new(PreferenceResolver::new(Arc::clone(&repos.preferences)));
        let inbox = Arc::new(InboxService::new(
            Arc::clone(&repos.inbox),
            Arc::clone(&self.broadcaster),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            self.config.dispatcher.clone(),
            DispatcherPorts {
                definitions: Arc::clone(&repos.definitions),
                events: Arc::clone(&repos.events),
                messages: Arc::clone(&repos.messages),
                attempts: Arc::clone(&repos.attempts),
                registry: Arc::clone(&registry),
                preferences: Arc::clone(&preferences),
                renderer: Arc::clone(&self.renderer),
                inbox: Arc::clone(&inbox),
                secrets: self.secrets.clone(),
                attachment_resolver: self.attachment_resolver.clone(),
            },
        ));
        let intake = Arc::new(IntakeService::new(
            self.config.intake.clone(),
            Arc::clone(&repos.definitions),
            Arc::clone(&repos.events),
            Arc::clone(&self.queue),
            Arc::clone(&dispatcher),
        ));

        tracing::debug!("Engine assembled");
        Engine {
            config: self.config,
            repos,
            registry,
            preferences,
            inbox,
            dispatcher,
            intake,
            secrets: self.secrets,
        }
    }
}
