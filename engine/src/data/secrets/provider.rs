use async_trait::async_trait;

use super::error::SecretError;
use super::types::{SecretDescription, SecretReference, SecretValue};

/// A secret backend.
///
/// `get` with a versionless reference returns the latest version by lexical
/// order; versions default to RFC 3339 nanosecond timestamps taken at write
/// time, so lexical order is write order.
#[async_trait]
pub trait SecretProvider: Send + Sync + std::fmt::Debug {
    /// Retrieve a secret. Absent secrets are `SecretError::NotFound`.
    async fn get(&self, reference: &SecretReference) -> Result<SecretValue, SecretError>;

    /// Store a secret, returning the written version.
    async fn put(&self, reference: &SecretReference, data: &[u8]) -> Result<String, SecretError>;

    /// Delete a secret (all versions, or the referenced one).
    async fn delete(&self, reference: &SecretReference) -> Result<(), SecretError>;

    /// Non-sensitive metadata for a stored secret.
    async fn describe(&self, reference: &SecretReference)
    -> Result<SecretDescription, SecretError>;

    /// Human-readable backend name
    fn name(&self) -> &'static str;
}
