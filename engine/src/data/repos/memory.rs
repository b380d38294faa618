//! In-memory repository backends
//!
//! `RwLock<HashMap>`-backed implementations of the repository ports, suitable
//! for tests and single-process embedded use. Writers take the lock for the
//! duration of the mutation; no lock is held across await points.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::data::types::{
    Definition, DeliveryAttempt, Event, EventStatus, InboxItem, Message, Preference,
    SubscriptionGroup, Template,
};

use super::{
    AttemptRepo, DefinitionRepo, EventRepo, InboxRepo, MessageRepo, Paging, PreferenceRepo,
    RepoError, SubscriptionGroupRepo, TemplateRepo,
};

fn page<T: Clone>(items: &[T], paging: Paging) -> Vec<T> {
    items
        .iter()
        .skip(paging.offset)
        .take(paging.limit)
        .cloned()
        .collect()
}

// =============================================================================
// Definitions
// =============================================================================

#[derive(Default)]
pub struct MemoryDefinitionRepo {
    rows: RwLock<HashMap<String, Definition>>,
}

impl MemoryDefinitionRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionRepo for MemoryDefinitionRepo {
    async fn create(&self, definition: &Definition) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&definition.code) {
            return Err(RepoError::Conflict(format!(
                "definition {} already exists",
                definition.code
            )));
        }
        rows.insert(definition.code.clone(), definition.clone());
        Ok(())
    }

    async fn update(&self, definition: &Definition) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&definition.code) {
            return Err(RepoError::not_found(&definition.code));
        }
        let mut updated = definition.clone();
        updated.updated_at = Utc::now();
        rows.insert(definition.code.clone(), updated);
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Definition>, RepoError> {
        Ok(self
            .rows
            .read()
            .get(code)
            .filter(|d| d.deleted_at.is_none())
            .cloned())
    }

    async fn list(&self, paging: Paging) -> Result<Vec<Definition>, RepoError> {
        let mut all: Vec<Definition> = self
            .rows
            .read()
            .values()
            .filter(|d| d.deleted_at.is_none())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(page(&all, paging))
    }

    async fn soft_delete(&self, code: &str) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        let definition = rows.get_mut(code).ok_or_else(|| RepoError::not_found(code))?;
        definition.deleted_at = Some(Utc::now());
        Ok(())
    }
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Default)]
pub struct MemoryTemplateRepo {
    rows: RwLock<HashMap<(String, String, String), Template>>,
}

impl MemoryTemplateRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(template: &Template) -> (String, String, String) {
        (
            template.code.clone(),
            template.locale.clone(),
            template.channel.clone(),
        )
    }
}

#[async_trait]
impl TemplateRepo for MemoryTemplateRepo {
    async fn create(&self, template: &Template) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        let key = Self::key(template);
        if rows.contains_key(&key) {
            return Err(RepoError::Conflict(format!(
                "template {}/{}/{} already exists",
                key.0, key.1, key.2
            )));
        }
        rows.insert(key, template.clone());
        Ok(())
    }

    async fn update(&self, template: &Template) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        let key = Self::key(template);
        if !rows.contains_key(&key) {
            return Err(RepoError::not_found(&template.code));
        }
        let mut updated = template.clone();
        updated.updated_at = Utc::now();
        rows.insert(key, updated);
        Ok(())
    }

    async fn get(
        &self,
        code: &str,
        locale: &str,
        channel: &str,
    ) -> Result<Option<Template>, RepoError> {
        let key = (code.to_string(), locale.to_string(), channel.to_string());
        Ok(self
            .rows
            .read()
            .get(&key)
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn list_by_code(&self, code: &str) -> Result<Vec<Template>, RepoError> {
        let mut all: Vec<Template> = self
            .rows
            .read()
            .values()
            .filter(|t| t.code == code && t.deleted_at.is_none())
            .cloned()
            .collect();
        all.sort_by(|a, b| (&a.locale, &a.channel).cmp(&(&b.locale, &b.channel)));
        Ok(all)
    }

    async fn list(&self, paging: Paging) -> Result<Vec<Template>, RepoError> {
        let mut all: Vec<Template> = self
            .rows
            .read()
            .values()
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .collect();
        all.sort_by(|a, b| (&a.code, &a.locale, &a.channel).cmp(&(&b.code, &b.locale, &b.channel)));
        Ok(page(&all, paging))
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct MemoryEventRepo {
    rows: RwLock<HashMap<Uuid, Event>>,
}

impl MemoryEventRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepo for MemoryEventRepo {
    async fn create(&self, event: &Event) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&event.id) {
            return Err(RepoError::Conflict(format!("event {} already exists", event.id)));
        }
        rows.insert(event.id, event.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, RepoError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: EventStatus) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        let event = rows.get_mut(&id).ok_or_else(|| RepoError::not_found(id.to_string()))?;
        event.status = status;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Event>, RepoError> {
        let mut pending: Vec<Event> = self
            .rows
            .read()
            .values()
            .filter(|e| e.status == EventStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.scheduled_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list(&self, paging: Paging) -> Result<Vec<Event>, RepoError> {
        let mut all: Vec<Event> = self.rows.read().values().cloned().collect();
        all.sort_by_key(|e| e.created_at);
        Ok(page(&all, paging))
    }
}

// =============================================================================
// Messages and attempts
// =============================================================================

#[derive(Default)]
pub struct MemoryMessageRepo {
    rows: RwLock<HashMap<Uuid, Message>>,
}

impl MemoryMessageRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepo for MemoryMessageRepo {
    async fn create(&self, message: &Message) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&message.id) {
            return Err(RepoError::Conflict(format!("message {} already exists", message.id)));
        }
        rows.insert(message.id, message.clone());
        Ok(())
    }

    async fn update(&self, message: &Message) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&message.id) {
            return Err(RepoError::not_found(message.id.to_string()));
        }
        let mut updated = message.clone();
        updated.updated_at = Utc::now();
        rows.insert(message.id, updated);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>, RepoError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Message>, RepoError> {
        let mut all: Vec<Message> = self
            .rows
            .read()
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect();
        all.sort_by_key(|m| m.created_at);
        Ok(all)
    }
}

#[derive(Default)]
pub struct MemoryAttemptRepo {
    rows: RwLock<Vec<DeliveryAttempt>>,
}

impl MemoryAttemptRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptRepo for MemoryAttemptRepo {
    async fn create(&self, attempt: &DeliveryAttempt) -> Result<(), RepoError> {
        self.rows.write().push(attempt.clone());
        Ok(())
    }

    async fn list_by_message(&self, message_id: Uuid) -> Result<Vec<DeliveryAttempt>, RepoError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|a| a.message_id == message_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Preferences
// =============================================================================

type PreferenceKey = (String, String, String, String);

#[derive(Default)]
pub struct MemoryPreferenceRepo {
    rows: RwLock<HashMap<PreferenceKey, Preference>>,
}

impl MemoryPreferenceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(
        subject_type: &str,
        subject_id: &str,
        definition_code: &str,
        channel: &str,
    ) -> PreferenceKey {
        (
            subject_type.to_string(),
            subject_id.to_string(),
            definition_code.to_string(),
            channel.to_string(),
        )
    }
}

#[async_trait]
impl PreferenceRepo for MemoryPreferenceRepo {
    async fn upsert(&self, preference: &Preference) -> Result<(), RepoError> {
        let key = Self::key(
            &preference.subject_type,
            &preference.subject_id,
            &preference.definition_code,
            &preference.channel,
        );
        let mut rows = self.rows.write();
        let mut row = preference.clone();
        row.deleted_at = None;
        row.updated_at = Utc::now();
        if let Some(existing) = rows.get(&key) {
            row.created_at = existing.created_at;
        }
        rows.insert(key, row);
        Ok(())
    }

    async fn get_by_subject(
        &self,
        subject_type: &str,
        subject_id: &str,
        definition_code: &str,
        channel: &str,
    ) -> Result<Option<Preference>, RepoError> {
        let key = Self::key(subject_type, subject_id, definition_code, channel);
        Ok(self
            .rows
            .read()
            .get(&key)
            .filter(|p| !p.is_deleted())
            .cloned())
    }

    async fn list_for_subject(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<Preference>, RepoError> {
        let mut all: Vec<Preference> = self
            .rows
            .read()
            .values()
            .filter(|p| {
                p.subject_type == subject_type && p.subject_id == subject_id && !p.is_deleted()
            })
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            (&a.definition_code, &a.channel).cmp(&(&b.definition_code, &b.channel))
        });
        Ok(all)
    }

    async fn soft_delete(
        &self,
        subject_type: &str,
        subject_id: &str,
        definition_code: &str,
        channel: &str,
    ) -> Result<(), RepoError> {
        let key = Self::key(subject_type, subject_id, definition_code, channel);
        let mut rows = self.rows.write();
        let preference = rows
            .get_mut(&key)
            .ok_or_else(|| RepoError::not_found(format!("preference {key:?}")))?;
        preference.deleted_at = Some(Utc::now());
        Ok(())
    }
}

// =============================================================================
// Subscription groups
// =============================================================================

#[derive(Default)]
pub struct MemorySubscriptionGroupRepo {
    rows: RwLock<HashMap<String, SubscriptionGroup>>,
}

impl MemorySubscriptionGroupRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionGroupRepo for MemorySubscriptionGroupRepo {
    async fn create(&self, group: &SubscriptionGroup) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&group.code) {
            return Err(RepoError::Conflict(format!("group {} already exists", group.code)));
        }
        rows.insert(group.code.clone(), group.clone());
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<SubscriptionGroup>, RepoError> {
        Ok(self.rows.read().get(code).cloned())
    }

    async fn list(&self, paging: Paging) -> Result<Vec<SubscriptionGroup>, RepoError> {
        let mut all: Vec<SubscriptionGroup> = self.rows.read().values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(page(&all, paging))
    }
}

// =============================================================================
// Inbox
// =============================================================================

#[derive(Default)]
pub struct MemoryInboxRepo {
    rows: RwLock<HashMap<Uuid, InboxItem>>,
}

impl MemoryInboxRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, id: Uuid, f: F) -> Result<(), RepoError>
    where
        F: FnOnce(&mut InboxItem),
    {
        let mut rows = self.rows.write();
        let item = rows.get_mut(&id).ok_or_else(|| RepoError::not_found(id.to_string()))?;
        f(item);
        item.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl InboxRepo for MemoryInboxRepo {
    async fn create(&self, item: &InboxItem) -> Result<(), RepoError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&item.id) {
            return Err(RepoError::Conflict(format!("inbox item {} already exists", item.id)));
        }
        rows.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<InboxItem>, RepoError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        paging: Paging,
    ) -> Result<(Vec<InboxItem>, usize), RepoError> {
        let mut all: Vec<InboxItem> = self
            .rows
            .read()
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len();
        Ok((page(&all, paging), total))
    }

    async fn mark_read(&self, id: Uuid, read: bool) -> Result<(), RepoError> {
        self.mutate(id, |item| {
            item.unread = !read;
            item.read_at = read.then(Utc::now);
        })
    }

    async fn snooze(&self, id: Uuid, until: DateTime<Utc>) -> Result<(), RepoError> {
        self.mutate(id, |item| item.snoozed_until = Some(until))
    }

    async fn dismiss(&self, id: Uuid) -> Result<(), RepoError> {
        self.mutate(id, |item| {
            item.dismissed_at = Some(Utc::now());
            item.unread = false;
        })
    }

    async fn count_unread(&self, user_id: &str) -> Result<usize, RepoError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|i| i.user_id == user_id && i.unread && i.dismissed_at.is_none())
            .count())
    }
}
