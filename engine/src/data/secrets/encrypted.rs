//! Encrypted secret provider over a record store
//!
//! Seals plaintext with ChaCha20-Poly1305 under a 32-byte key before it ever
//! reaches the store; the store only sees ciphertext and nonces. Versions are
//! RFC 3339 nanosecond timestamps taken at write time, so lexical order is
//! write order.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chacha20poly1305::{
    ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, OsRng, rand_core::RngCore},
};
use chrono::{SecondsFormat, Utc};

use crate::core::constants::ENCRYPTION_KEY_LEN;
use crate::data::types::Metadata;

use super::error::SecretError;
use super::provider::SecretProvider;
use super::store::SecretStore;
use super::types::{SecretDescription, SecretRecord, SecretReference, SecretValue};

const NONCE_SIZE: usize = 12;

pub struct EncryptedStoreProvider {
    store: Arc<dyn SecretStore>,
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for EncryptedStoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedStoreProvider").finish_non_exhaustive()
    }
}

impl EncryptedStoreProvider {
    pub fn new(key: &[u8; ENCRYPTION_KEY_LEN], store: Arc<dyn SecretStore>) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(key).expect("32-byte key");
        Self { store, cipher }
    }

    fn fetch(&self, record: SecretRecord) -> Result<SecretValue, SecretError> {
        let nonce = Nonce::from_slice(&record.nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, record.ciphertext.as_slice())
            .map_err(|e| SecretError::Crypto(format!("open failed: {e:?}")))?;
        let mut value = SecretValue::new(plaintext, record.version);
        value.metadata = record.metadata;
        Ok(value)
    }
}

#[async_trait]
impl SecretProvider for EncryptedStoreProvider {
    async fn get(&self, reference: &SecretReference) -> Result<SecretValue, SecretError> {
        reference.validate()?;
        let record = match &reference.version {
            Some(version) => self.store.get_version(reference, version).await?,
            None => self.store.get_latest(reference).await?,
        };
        let record = record.ok_or_else(|| SecretError::NotFound(reference.cache_key()))?;
        self.fetch(record)
    }

    async fn put(&self, reference: &SecretReference, data: &[u8]) -> Result<String, SecretError> {
        reference.validate()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|e| SecretError::Crypto(format!("seal failed: {e:?}")))?;

        let now = Utc::now();
        let version = reference
            .version
            .clone()
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Nanos, true));

        let mut metadata = Metadata::new();
        metadata.insert("created_at".into(), now.to_rfc3339().into());

        self.store
            .put(&SecretRecord {
                scope: reference.scope,
                subject_id: reference.subject_id.clone(),
                channel: reference.channel.clone(),
                provider: reference.provider.clone(),
                key: reference.key.clone(),
                version: version.clone(),
                ciphertext,
                nonce: nonce_bytes.to_vec(),
                metadata,
                created_at: now,
            })
            .await?;

        Ok(version)
    }

    async fn delete(&self, reference: &SecretReference) -> Result<(), SecretError> {
        reference.validate()?;
        self.store.delete(reference).await
    }

    async fn describe(
        &self,
        reference: &SecretReference,
    ) -> Result<SecretDescription, SecretError> {
        reference.validate()?;
        let record = match &reference.version {
            Some(version) => self.store.get_version(reference, version).await?,
            None => self.store.get_latest(reference).await?,
        };
        let record = record.ok_or_else(|| SecretError::NotFound(reference.cache_key()))?;
        Ok(SecretDescription {
            version: record.version,
            created_at: record.created_at,
            metadata: record.metadata,
        })
    }

    fn name(&self) -> &'static str {
        "encrypted-store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::secrets::store::MemorySecretStore;

    fn provider() -> EncryptedStoreProvider {
        EncryptedStoreProvider::new(&[7u8; 32], Arc::new(MemorySecretStore::new()))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let provider = provider();
        let reference = SecretReference::user("bob", "chat", "slack", "default");

        let version = provider.put(&reference, b"xoxb-bob").await.unwrap();
        let value = provider.get(&reference).await.unwrap();
        assert_eq!(value.data, b"xoxb-bob");
        assert_eq!(value.version, version);

        // A pinned version reads the exact write
        let pinned = provider.get(&reference.clone().with_version(version)).await.unwrap();
        assert_eq!(pinned.data, b"xoxb-bob");
    }

    #[tokio::test]
    async fn test_latest_wins_after_rewrite() {
        let provider = provider();
        let reference = SecretReference::user("bob", "chat", "slack", "default");
        let v1 = provider.put(&reference, b"old").await.unwrap();
        let v2 = provider.put(&reference, b"new").await.unwrap();
        assert!(v1 < v2);

        let latest = provider.get(&reference).await.unwrap();
        assert_eq!(latest.data, b"new");
        let old = provider.get(&reference.clone().with_version(v1)).await.unwrap();
        assert_eq!(old.data, b"old");
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let provider = provider();
        let reference = SecretReference::user("bob", "chat", "slack", "default");
        let err = provider.get(&reference).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_reference_rejected() {
        let provider = provider();
        let reference = SecretReference::user("", "chat", "slack", "default");
        assert!(matches!(
            provider.get(&reference).await,
            Err(SecretError::InvalidReference(_))
        ));
        assert!(matches!(
            provider.put(&reference, b"x").await,
            Err(SecretError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_fails_to_open() {
        let store = Arc::new(MemorySecretStore::new());
        let writer = EncryptedStoreProvider::new(&[7u8; 32], Arc::clone(&store) as Arc<dyn SecretStore>);
        let reader = EncryptedStoreProvider::new(&[8u8; 32], store);

        let reference = SecretReference::user("bob", "chat", "slack", "default");
        writer.put(&reference, b"xoxb-bob").await.unwrap();
        assert!(matches!(
            reader.get(&reference).await,
            Err(SecretError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_has_no_payload() {
        let provider = provider();
        let reference = SecretReference::user("bob", "chat", "slack", "default");
        provider.put(&reference, b"xoxb-bob").await.unwrap();
        let description = provider.describe(&reference).await.unwrap();
        let rendered = serde_json::to_string(&description).unwrap();
        assert!(!rendered.contains("xoxb-bob"));
    }
}
