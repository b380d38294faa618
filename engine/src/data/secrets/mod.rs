//! Scoped secret management
//!
//! Secrets are addressed by `(scope, subject, channel, provider, key)` and
//! resolved through a provider port. The default wiring encrypts records with
//! ChaCha20-Poly1305 before they reach the store and caches resolved values
//! with a TTL. Values are opaque; diagnostics only ever see masked renderings.

pub mod cached;
pub mod encrypted;
mod error;
mod provider;
pub mod resolver;
pub mod store;
mod types;

pub use error::SecretError;
pub use provider::SecretProvider;
pub use types::{SecretDescription, SecretRecord, SecretReference, SecretScope, SecretValue};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cached::CachingResolver;
use encrypted::EncryptedStoreProvider;
use resolver::{ProviderResolver, SecretResolver};
use store::{MemorySecretStore, SecretStore};

use crate::core::constants::{DEFAULT_SECRET_KEY, ENCRYPTION_KEY_LEN, SYSTEM_SUBJECT_ID};

#[derive(Debug, Clone)]
pub struct SecretManager {
    provider: Arc<dyn SecretProvider>,
    resolver: Arc<dyn SecretResolver>,
}

impl SecretManager {
    /// Wire a provider behind the batching resolver with an optional cache
    /// TTL.
    pub fn new(provider: Arc<dyn SecretProvider>, cache_ttl: Option<Duration>) -> Self {
        let resolver: Arc<dyn SecretResolver> = Arc::new(CachingResolver::new(
            Arc::new(ProviderResolver::new(Arc::clone(&provider))),
            cache_ttl,
        ));
        tracing::debug!(backend = provider.name(), "Secret manager initialized");
        Self { provider, resolver }
    }

    /// Encrypted in-memory wiring, used by tests and embedded setups.
    pub fn encrypted_memory(
        key: &[u8; ENCRYPTION_KEY_LEN],
        cache_ttl: Option<Duration>,
    ) -> Self {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        Self::new(Arc::new(EncryptedStoreProvider::new(key, store)), cache_ttl)
    }

    pub async fn get(&self, reference: &SecretReference) -> Result<SecretValue, SecretError> {
        self.provider.get(reference).await
    }

    pub async fn put(
        &self,
        reference: &SecretReference,
        data: &[u8],
    ) -> Result<String, SecretError> {
        self.provider.put(reference, data).await
    }

    pub async fn delete(&self, reference: &SecretReference) -> Result<(), SecretError> {
        self.provider.delete(reference).await
    }

    pub async fn describe(
        &self,
        reference: &SecretReference,
    ) -> Result<SecretDescription, SecretError> {
        self.provider.describe(reference).await
    }

    /// Resolve a batch of references through the caching resolver.
    pub async fn resolve(
        &self,
        references: &[SecretReference],
    ) -> Result<HashMap<SecretReference, SecretValue>, SecretError> {
        self.resolver.resolve(references).await
    }

    /// Resolve an ordered fallback chain; the first reference with a value
    /// wins.
    pub async fn resolve_first(
        &self,
        references: &[SecretReference],
    ) -> Result<Option<(SecretReference, SecretValue)>, SecretError> {
        let mut resolved = self.resolve(references).await?;
        for reference in references {
            if let Some(value) = resolved.remove(reference) {
                return Ok(Some((reference.clone(), value)));
            }
        }
        Ok(None)
    }
}

/// The scoped lookup chain the dispatcher issues for a delivery:
/// user, then tenant (when known), then system, all with the default key.
pub fn delivery_references(
    recipient: &str,
    tenant_id: Option<&str>,
    channel: &str,
    provider: &str,
) -> Vec<SecretReference> {
    let mut references = vec![SecretReference::user(
        recipient,
        channel,
        provider,
        DEFAULT_SECRET_KEY,
    )];
    if let Some(tenant) = tenant_id {
        references.push(SecretReference::tenant(
            tenant,
            channel,
            provider,
            DEFAULT_SECRET_KEY,
        ));
    }
    references.push(SecretReference::system(
        SYSTEM_SUBJECT_ID,
        channel,
        provider,
        DEFAULT_SECRET_KEY,
    ));
    references
}
