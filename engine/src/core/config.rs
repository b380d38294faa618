//! Engine configuration
//!
//! Every tunable is an explicit struct field with a serde default; nothing is
//! read from ambient globals. The encryption key is the one value sourced from
//! the environment, and only at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_BROADCAST_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_WORKERS,
    DEFAULT_PING_INTERVAL_SECS, DEFAULT_REALTIME_SEND_BUFFER, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_SCHEDULE_GRACE_SECS, DEFAULT_SECRETS_CACHE_TTL_SECS, ENCRYPTION_KEY_LEN,
    ENV_ENCRYPTION_KEY,
};

/// Dispatcher fan-out and retry tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Worker pool ceiling; clamped to the job count per dispatch
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Delivery attempts per messenger candidate
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff base in milliseconds (attempt * base)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Recipients or tenants allowed to deliver without a resolved secret
    #[serde(default)]
    pub env_fallback_allowlist: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            env_fallback_allowlist: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Whether a recipient or tenant may fall back to adapter-side defaults
    /// when no scoped secret resolves.
    pub fn allows_env_fallback(&self, recipient: &str, tenant_id: Option<&str>) -> bool {
        self.env_fallback_allowlist.iter().any(|entry| {
            entry == recipient || tenant_id.is_some_and(|t| entry == t)
        })
    }
}

/// Intake routing tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Requests scheduled within this window of now dispatch immediately
    #[serde(default = "default_schedule_grace_secs")]
    pub schedule_grace_secs: i64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            schedule_grace_secs: DEFAULT_SCHEDULE_GRACE_SECS,
        }
    }
}

/// Secrets subsystem tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// TTL for cached resolver entries in seconds; 0 disables caching
    #[serde(default = "default_secrets_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_SECRETS_CACHE_TTL_SECS,
        }
    }
}

impl SecretsConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

/// Realtime hub tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Per-client send buffer; a full buffer evicts the client
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
    /// Timeout for handing a broadcast to the hub loop
    #[serde(default = "default_broadcast_timeout_secs")]
    pub broadcast_timeout_secs: u64,
    /// Keepalive ping interval
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_buffer: DEFAULT_REALTIME_SEND_BUFFER,
            broadcast_timeout_secs: DEFAULT_BROADCAST_TIMEOUT_SECS,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
        }
    }
}

impl RealtimeConfig {
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Aggregate engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Load the 32-byte secret store key from the environment.
///
/// A missing or malformed value logs a warning and yields the all-zero key so
/// tests and local runs work without setup. Production deployments must set
/// the variable.
pub fn load_encryption_key() -> [u8; ENCRYPTION_KEY_LEN] {
    match std::env::var(ENV_ENCRYPTION_KEY) {
        Ok(raw) => match decode_encryption_key(&raw) {
            Some(key) => key,
            None => {
                tracing::warn!(
                    var = ENV_ENCRYPTION_KEY,
                    "Encryption key is not {ENCRYPTION_KEY_LEN} hex-encoded bytes, using the default test key"
                );
                [0u8; ENCRYPTION_KEY_LEN]
            }
        },
        Err(_) => {
            tracing::warn!(
                var = ENV_ENCRYPTION_KEY,
                "Encryption key not set, using the default test key"
            );
            [0u8; ENCRYPTION_KEY_LEN]
        }
    }
}

fn decode_encryption_key(raw: &str) -> Option<[u8; ENCRYPTION_KEY_LEN]> {
    let bytes = hex::decode(raw.trim()).ok()?;
    bytes.try_into().ok()
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

fn default_schedule_grace_secs() -> i64 {
    DEFAULT_SCHEDULE_GRACE_SECS
}

fn default_secrets_cache_ttl_secs() -> u64 {
    DEFAULT_SECRETS_CACHE_TTL_SECS
}

fn default_send_buffer() -> usize {
    DEFAULT_REALTIME_SEND_BUFFER
}

fn default_broadcast_timeout_secs() -> u64 {
    DEFAULT_BROADCAST_TIMEOUT_SECS
}

fn default_ping_interval_secs() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}
