//! Secret record store port and memory backend

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::SecretError;
use super::types::{SecretRecord, SecretReference, SecretScope};

/// Filters for listing stored secret records.
#[derive(Debug, Clone, Default)]
pub struct SecretFilter {
    pub scope: Option<SecretScope>,
    pub subject_id: Option<String>,
    pub channel: Option<String>,
    pub provider: Option<String>,
}

/// Persistence for encrypted secret records.
///
/// Records are unique on `(scope, subject_id, channel, provider, key,
/// version)`; writing the same tuple again replaces it. Writes are serialized
/// by the store, reads are concurrent-safe.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(&self, record: &SecretRecord) -> Result<(), SecretError>;
    /// Latest version for the reference tuple by lexical version order.
    async fn get_latest(
        &self,
        reference: &SecretReference,
    ) -> Result<Option<SecretRecord>, SecretError>;
    async fn get_version(
        &self,
        reference: &SecretReference,
        version: &str,
    ) -> Result<Option<SecretRecord>, SecretError>;
    /// Remove every version of the reference tuple.
    async fn delete(&self, reference: &SecretReference) -> Result<(), SecretError>;
    async fn list(&self, filter: SecretFilter) -> Result<Vec<SecretRecord>, SecretError>;
}

fn tuple_key(reference: &SecretReference) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        reference.scope, reference.subject_id, reference.channel, reference.provider,
        reference.key
    )
}

/// In-memory secret record store.
#[derive(Default)]
pub struct MemorySecretStore {
    /// Versions per tuple, kept sorted by version ascending
    rows: RwLock<HashMap<String, Vec<SecretRecord>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, record: &SecretRecord) -> Result<(), SecretError> {
        let mut rows = self.rows.write();
        let versions = rows.entry(tuple_key(&record.reference())).or_default();
        match versions.iter_mut().find(|r| r.version == record.version) {
            Some(existing) => *existing = record.clone(),
            None => {
                versions.push(record.clone());
                versions.sort_by(|a, b| a.version.cmp(&b.version));
            }
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        reference: &SecretReference,
    ) -> Result<Option<SecretRecord>, SecretError> {
        Ok(self
            .rows
            .read()
            .get(&tuple_key(reference))
            .and_then(|versions| versions.last().cloned()))
    }

    async fn get_version(
        &self,
        reference: &SecretReference,
        version: &str,
    ) -> Result<Option<SecretRecord>, SecretError> {
        Ok(self
            .rows
            .read()
            .get(&tuple_key(reference))
            .and_then(|versions| versions.iter().find(|r| r.version == version).cloned()))
    }

    async fn delete(&self, reference: &SecretReference) -> Result<(), SecretError> {
        self.rows.write().remove(&tuple_key(reference));
        Ok(())
    }

    async fn list(&self, filter: SecretFilter) -> Result<Vec<SecretRecord>, SecretError> {
        let rows = self.rows.read();
        let mut out: Vec<SecretRecord> = rows
            .values()
            .flatten()
            .filter(|r| {
                filter.scope.is_none_or(|s| s == r.scope)
                    && filter.subject_id.as_deref().is_none_or(|s| s == r.subject_id)
                    && filter.channel.as_deref().is_none_or(|c| c == r.channel)
                    && filter.provider.as_deref().is_none_or(|p| p == r.provider)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (tuple_key(&a.reference()), &a.version).cmp(&(tuple_key(&b.reference()), &b.version)));
        Ok(out)
    }
}
