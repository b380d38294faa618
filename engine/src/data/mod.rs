//! Data layer
//!
//! Entity types, repository ports with in-memory backends, the deferred work
//! queue port, and the scoped secrets subsystem.

pub mod queue;
pub mod repos;
pub mod secrets;
pub mod types;

pub use queue::{CaptureQueue, NoopQueue, Queue, QueueError, QueueJob};
pub use repos::{Paging, RepoError};
pub use secrets::{SecretError, SecretManager, SecretReference, SecretScope, SecretValue};
