//! Adapter registry
//!
//! Holds messengers by normalized provider name and indexes them by the
//! channels they declare. Registrations happen at startup; lookups are
//! read-heavy, so the state sits behind a read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::data::types::ChannelAddress;

use super::messenger::Messenger;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no adapter matches route {0}")]
    AdapterNotFound(String),
}

#[derive(Default)]
struct Inner {
    /// Messengers by normalized provider name
    adapters: HashMap<String, Arc<dyn Messenger>>,
    /// Messengers by normalized channel, in registration order
    by_channel: HashMap<String, Vec<Arc<dyn Messenger>>>,
}

#[derive(Default)]
pub struct AdapterRegistry {
    inner: RwLock<Inner>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a messenger under its name and each declared channel.
    /// Re-registering a name replaces the previous entry everywhere.
    pub fn register(&self, messenger: Arc<dyn Messenger>) {
        let name = messenger.name().trim().to_ascii_lowercase();
        let channels: Vec<String> = messenger
            .capabilities()
            .channels
            .iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        let mut inner = self.inner.write();
        if inner.adapters.remove(&name).is_some() {
            for list in inner.by_channel.values_mut() {
                list.retain(|m| m.name().trim().to_ascii_lowercase() != name);
            }
        }
        inner.adapters.insert(name.clone(), Arc::clone(&messenger));
        for channel in channels {
            inner
                .by_channel
                .entry(channel)
                .or_default()
                .push(Arc::clone(&messenger));
        }
        tracing::debug!(adapter = %name, "Registered messenger");
    }

    /// Resolve one messenger for a route.
    ///
    /// A provider-qualified route looks up by name; an unqualified route
    /// returns the first messenger registered for the channel.
    pub fn route(&self, route: &str) -> Result<Arc<dyn Messenger>, RegistryError> {
        let address = ChannelAddress::parse(route);
        let inner = self.inner.read();
        let found = match &address.provider {
            Some(provider) => inner.adapters.get(provider).cloned(),
            None => inner
                .by_channel
                .get(&address.base)
                .and_then(|list| list.first().cloned()),
        };
        found.ok_or_else(|| RegistryError::AdapterNotFound(address.route()))
    }

    /// All messengers under the exact route key. A provider-qualified route
    /// with no exact entry falls back to the base channel's list, which
    /// serves capability discovery.
    pub fn list(&self, route: &str) -> Vec<Arc<dyn Messenger>> {
        let address = ChannelAddress::parse(route);
        let inner = self.inner.read();
        if let Some(list) = inner.by_channel.get(&address.route())
            && !list.is_empty()
        {
            return list.clone();
        }
        if address.provider.is_some() {
            return inner.by_channel.get(&address.base).cloned().unwrap_or_default();
        }
        Vec::new()
    }

    /// Delivery candidates for a parsed address, in registration order.
    ///
    /// A provider qualifier restricts the result to that single adapter; an
    /// empty result is the caller's `AdapterNotFound`.
    pub fn candidates(&self, address: &ChannelAddress) -> Vec<Arc<dyn Messenger>> {
        let inner = self.inner.read();
        match &address.provider {
            Some(provider) => inner.adapters.get(provider).cloned().into_iter().collect(),
            None => inner.by_channel.get(&address.base).cloned().unwrap_or_default(),
        }
    }

    /// Names of all registered adapters, for diagnostics.
    pub fn adapter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::messenger::{Capabilities, OutboundMessage, SendError};
    use async_trait::async_trait;

    struct FakeMessenger {
        name: String,
        channels: Vec<String>,
    }

    impl FakeMessenger {
        fn new(name: &str, channels: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                channels: channels.iter().map(|c| c.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
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

        async fn send(&self, _message: &OutboundMessage) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn registry() -> AdapterRegistry {
        let registry = AdapterRegistry::new();
        registry.register(FakeMessenger::new("slack", &["chat", "slack"]));
        registry.register(FakeMessenger::new("telegram", &["chat", "telegram"]));
        registry
    }

    #[test]
    fn test_route_unqualified_returns_first_registered() {
        let registry = registry();
        assert_eq!(registry.route("chat").unwrap().name(), "slack");
    }

    #[test]
    fn test_route_qualified_by_name() {
        let registry = registry();
        assert_eq!(registry.route("chat:telegram").unwrap().name(), "telegram");
        assert!(matches!(
            registry.route("chat:twilio"),
            Err(RegistryError::AdapterNotFound(_))
        ));
    }

    #[test]
    fn test_route_normalizes_input() {
        let registry = registry();
        assert_eq!(registry.route("Chat:Slack ").unwrap().name(), "slack");
    }

    #[test]
    fn test_candidates_registration_order() {
        let registry = registry();
        let names: Vec<String> = registry
            .candidates(&ChannelAddress::parse("chat"))
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["slack", "telegram"]);
    }

    #[test]
    fn test_candidates_provider_restricts() {
        let registry = registry();
        let candidates = registry.candidates(&ChannelAddress::parse("chat:telegram"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "telegram");
        assert!(registry.candidates(&ChannelAddress::parse("chat:twilio")).is_empty());
    }

    #[test]
    fn test_list_falls_back_to_base_for_discovery() {
        let registry = registry();
        // Exact channel key
        assert_eq!(registry.list("slack").len(), 1);
        // Qualified route with no exact entry falls back to the base list
        assert_eq!(registry.list("chat:twilio").len(), 2);
        // Unqualified unknown channel stays empty
        assert!(registry.list("sms").is_empty());
    }

    #[test]
    fn test_reregister_replaces_by_name() {
        let registry = registry();
        registry.register(FakeMessenger::new("slack", &["chat"]));
        let candidates = registry.candidates(&ChannelAddress::parse("chat"));
        let slack_count = candidates.iter().filter(|m| m.name() == "slack").count();
        assert_eq!(slack_count, 1);
        // The replacement dropped the old "slack" channel entry
        assert!(registry.candidates(&ChannelAddress::parse("slack")).is_empty());
        // Replacement moves the adapter to the back of the channel order
        let names: Vec<String> = candidates.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["telegram".to_string(), "slack".to_string()]);
    }
}
