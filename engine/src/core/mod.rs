//! Engine configuration and constants

pub mod config;
pub mod constants;

pub use config::{
    DispatcherConfig, EngineConfig, IntakeConfig, RealtimeConfig, SecretsConfig,
    load_encryption_key,
};
