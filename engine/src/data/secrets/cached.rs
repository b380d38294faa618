//! TTL-caching secret resolver

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::core::constants::SECRETS_CACHE_MAX_CAPACITY;

use super::error::SecretError;
use super::resolver::SecretResolver;
use super::types::{SecretReference, SecretValue};

/// Wraps a resolver with a per-entry TTL cache.
///
/// Fresh hits are served from the cache; all misses of a batch are forwarded
/// to the inner resolver in one call. Errors are never cached. A `None` TTL
/// disables caching entirely and the wrapper becomes a passthrough.
pub struct CachingResolver {
    inner: Arc<dyn SecretResolver>,
    cache: Option<Cache<String, SecretValue>>,
}

impl std::fmt::Debug for CachingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingResolver")
            .field("inner", &self.inner)
            .field("caching", &self.cache.is_some())
            .finish()
    }
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn SecretResolver>, ttl: Option<Duration>) -> Self {
        let cache = ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| {
            Cache::builder()
                .max_capacity(SECRETS_CACHE_MAX_CAPACITY)
                .time_to_live(ttl)
                .build()
        });
        Self { inner, cache }
    }
}

#[async_trait]
impl SecretResolver for CachingResolver {
    async fn resolve(
        &self,
        references: &[SecretReference],
    ) -> Result<HashMap<SecretReference, SecretValue>, SecretError> {
        let Some(cache) = &self.cache else {
            return self.inner.resolve(references).await;
        };

        let mut resolved = HashMap::with_capacity(references.len());
        let mut misses = Vec::new();
        for reference in references {
            match cache.get(&reference.cache_key()).await {
                Some(value) => {
                    resolved.insert(reference.clone(), value);
                }
                None => misses.push(reference.clone()),
            }
        }

        if !misses.is_empty() {
            let fetched = self.inner.resolve(&misses).await?;
            for (reference, value) in fetched {
                cache.insert(reference.cache_key(), value.clone()).await;
                resolved.insert(reference, value);
            }
        }

        Ok(resolved)
    }
}
