//! Repository ports
//!
//! Storage contracts for every persisted entity. The engine depends on these
//! traits only; `memory` provides `RwLock`-backed implementations for tests
//! and embedded use. Row stores (SQL or otherwise) implement the same traits
//! outside the core.

mod error;
pub mod memory;

pub use error::RepoError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{
    Definition, DeliveryAttempt, Event, EventStatus, InboxItem, Message, Preference,
    SubscriptionGroup, Template,
};

/// Offset pagination shared by list operations.
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Paging {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

#[async_trait]
pub trait DefinitionRepo: Send + Sync {
    async fn create(&self, definition: &Definition) -> Result<(), RepoError>;
    async fn update(&self, definition: &Definition) -> Result<(), RepoError>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Definition>, RepoError>;
    async fn list(&self, paging: Paging) -> Result<Vec<Definition>, RepoError>;
    async fn soft_delete(&self, code: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TemplateRepo: Send + Sync {
    async fn create(&self, template: &Template) -> Result<(), RepoError>;
    async fn update(&self, template: &Template) -> Result<(), RepoError>;
    async fn get(
        &self,
        code: &str,
        locale: &str,
        channel: &str,
    ) -> Result<Option<Template>, RepoError>;
    async fn list_by_code(&self, code: &str) -> Result<Vec<Template>, RepoError>;
    async fn list(&self, paging: Paging) -> Result<Vec<Template>, RepoError>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn create(&self, event: &Event) -> Result<(), RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<Event>, RepoError>;
    async fn update_status(&self, id: Uuid, status: EventStatus) -> Result<(), RepoError>;
    /// Pending events ordered by `scheduled_at`, oldest first.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Event>, RepoError>;
    async fn list(&self, paging: Paging) -> Result<Vec<Event>, RepoError>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn create(&self, message: &Message) -> Result<(), RepoError>;
    async fn update(&self, message: &Message) -> Result<(), RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<Message>, RepoError>;
    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Message>, RepoError>;
}

#[async_trait]
pub trait AttemptRepo: Send + Sync {
    async fn create(&self, attempt: &DeliveryAttempt) -> Result<(), RepoError>;
    /// Attempts for a message in creation order.
    async fn list_by_message(&self, message_id: Uuid) -> Result<Vec<DeliveryAttempt>, RepoError>;
}

#[async_trait]
pub trait PreferenceRepo: Send + Sync {
    /// Insert or replace the live row for the preference's identity tuple,
    /// preserving `created_at` on replace.
    async fn upsert(&self, preference: &Preference) -> Result<(), RepoError>;
    async fn get_by_subject(
        &self,
        subject_type: &str,
        subject_id: &str,
        definition_code: &str,
        channel: &str,
    ) -> Result<Option<Preference>, RepoError>;
    async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<Preference>, RepoError>;
    async fn soft_delete(
        &self,
        subject_type: &str,
        subject_id: &str,
        definition_code: &str,
        channel: &str,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SubscriptionGroupRepo: Send + Sync {
    async fn create(&self, group: &SubscriptionGroup) -> Result<(), RepoError>;
    async fn get_by_code(&self, code: &str) -> Result<Option<SubscriptionGroup>, RepoError>;
    async fn list(&self, paging: Paging) -> Result<Vec<SubscriptionGroup>, RepoError>;
}

#[async_trait]
pub trait InboxRepo: Send + Sync {
    async fn create(&self, item: &InboxItem) -> Result<(), RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<InboxItem>, RepoError>;
    /// Items for a user, newest first, with the pre-filter total.
    async fn list_by_user(
        &self,
        user_id: &str,
        paging: Paging,
    ) -> Result<(Vec<InboxItem>, usize), RepoError>;
    /// Set the unread flag; stamps `read_at` on read and clears it on unread.
    async fn mark_read(&self, id: Uuid, read: bool) -> Result<(), RepoError>;
    async fn snooze(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), RepoError>;
    async fn dismiss(&self, id: Uuid) -> Result<(), RepoError>;
    async fn count_unread(&self, user_id: &str) -> Result<usize, RepoError>;
}
