//! Engine-wide constants and defaults

/// Default dispatcher worker pool size
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default delivery attempts per messenger candidate
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for the linear retry backoff (attempt * base)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Grace window separating "immediate" from "scheduled" intake requests
pub const DEFAULT_SCHEDULE_GRACE_SECS: i64 = 1;

/// Default TTL for cached secret lookups (0 disables caching)
pub const DEFAULT_SECRETS_CACHE_TTL_SECS: u64 = 300;

/// Maximum cached secret entries
pub const SECRETS_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Per-client send buffer for the realtime hub
pub const DEFAULT_REALTIME_SEND_BUFFER: usize = 256;

/// Timeout for handing a broadcast to the hub loop
pub const DEFAULT_BROADCAST_TIMEOUT_SECS: u64 = 5;

/// Interval between hub keepalive pings
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Environment variable carrying the 32-byte secret store key (hex)
pub const ENV_ENCRYPTION_KEY: &str = "HERALD_ENCRYPTION_KEY";

/// Required key length for the encrypted secret store
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Secret key name the dispatcher resolves for every delivery
pub const DEFAULT_SECRET_KEY: &str = "default";

/// Subject id used for system-scoped secret references
pub const SYSTEM_SUBJECT_ID: &str = "default";

/// Base channel names routed to the inbox service instead of messengers
pub const INBOX_CHANNEL_ALIASES: [&str; 4] = ["inbox", "in-app", "inapp", "in_app"];

/// Broadcast topics emitted by the inbox service
pub const TOPIC_INBOX_CREATED: &str = "inbox.created";
pub const TOPIC_INBOX_UPDATED: &str = "inbox.updated";

/// Default content type for attachments without one
pub const DEFAULT_ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";
