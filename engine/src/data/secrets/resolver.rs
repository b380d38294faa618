//! Batched secret resolution
//!
//! A resolver turns an ordered batch of references into values. The provider
//! resolver skips `NotFound` entries so callers can express scope fallback
//! chains; every other error aborts the batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::SecretError;
use super::provider::SecretProvider;
use super::types::{SecretReference, SecretValue};

#[async_trait]
pub trait SecretResolver: Send + Sync + std::fmt::Debug {
    async fn resolve(
        &self,
        references: &[SecretReference],
    ) -> Result<HashMap<SecretReference, SecretValue>, SecretError>;
}

/// Resolves a batch against a single provider.
#[derive(Debug)]
pub struct ProviderResolver {
    provider: Arc<dyn SecretProvider>,
}

impl ProviderResolver {
    pub fn new(provider: Arc<dyn SecretProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SecretResolver for ProviderResolver {
    async fn resolve(
        &self,
        references: &[SecretReference],
    ) -> Result<HashMap<SecretReference, SecretValue>, SecretError> {
        let mut resolved = HashMap::with_capacity(references.len());
        for reference in references {
            match self.provider.get(reference).await {
                Ok(value) => {
                    resolved.insert(reference.clone(), value);
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(resolved)
    }
}
