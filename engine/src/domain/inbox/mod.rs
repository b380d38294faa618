//! In-app inbox service
//!
//! Exclusive owner of inbox item mutation. Every mutation emits a lifecycle
//! event through the broadcaster; broadcaster failures are logged and never
//! fail the mutation. Ownership mismatches are silently skipped so callers
//! cannot probe for other users' item ids.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::constants::{TOPIC_INBOX_CREATED, TOPIC_INBOX_UPDATED};
use crate::data::repos::{InboxRepo, Paging, RepoError};
use crate::data::types::{InboxItem, Message, Metadata};
use crate::domain::realtime::{BroadcastEvent, Broadcaster};

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct CreateInboxItem {
    pub user_id: String,
    pub message_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub locale: Option<String>,
    pub action_url: Option<String>,
    pub pinned: bool,
    pub metadata: Option<Metadata>,
}

/// Post-pagination filters for listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub unread_only: bool,
    pub include_dismissed: bool,
    pub pinned_only: bool,
    pub snoozed_only: bool,
    /// Keep items created strictly before this instant
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<InboxItem>,
    pub total: usize,
}

pub struct InboxService {
    repo: Arc<dyn InboxRepo>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl InboxService {
    pub fn new(repo: Arc<dyn InboxRepo>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { repo, broadcaster }
    }

    pub async fn create(&self, input: CreateInboxItem) -> Result<InboxItem, InboxError> {
        for (field, value) in [
            ("user_id", &input.user_id),
            ("title", &input.title),
            ("body", &input.body),
        ] {
            if value.trim().is_empty() {
                return Err(InboxError::Validation(format!("{} is required", field)));
            }
        }

        let mut item = InboxItem::new(input.user_id, input.title, input.body);
        item.message_id = input.message_id;
        item.locale = input.locale.unwrap_or_default();
        item.action_url = input.action_url;
        item.pinned = input.pinned;
        if let Some(metadata) = input.metadata {
            item.metadata = metadata;
        }

        self.repo.create(&item).await?;
        self.emit(TOPIC_INBOX_CREATED, &item).await;
        Ok(item)
    }

    pub async fn list(
        &self,
        user_id: &str,
        paging: Paging,
        filters: ListFilters,
    ) -> Result<ListResult, InboxError> {
        let (items, total) = self.repo.list_by_user(user_id, paging).await?;
        let items = items
            .into_iter()
            .filter(|item| {
                if !filters.include_dismissed && item.is_dismissed() {
                    return false;
                }
                if filters.unread_only && !item.unread {
                    return false;
                }
                if filters.pinned_only && !item.pinned {
                    return false;
                }
                if filters.snoozed_only && item.snoozed_until.is_none() {
                    return false;
                }
                if let Some(before) = filters.before
                    && item.created_at >= before
                {
                    return false;
                }
                true
            })
            .collect();
        Ok(ListResult { items, total })
    }

    /// Mark items read or unread. Items that don't exist or belong to another
    /// user are skipped without error.
    pub async fn mark_read(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<(), InboxError> {
        for &id in ids {
            let Some(item) = self.owned(user_id, id).await? else {
                continue;
            };
            self.repo.mark_read(item.id, read).await?;
            self.emit_updated(id).await?;
        }
        Ok(())
    }

    pub async fn snooze(
        &self,
        user_id: &str,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), InboxError> {
        let Some(item) = self.owned(user_id, id).await? else {
            return Ok(());
        };
        self.repo.snooze(item.id, until).await?;
        self.emit_updated(id).await?;
        Ok(())
    }

    pub async fn dismiss(&self, user_id: &str, id: Uuid) -> Result<(), InboxError> {
        let Some(item) = self.owned(user_id, id).await? else {
            return Ok(());
        };
        self.repo.dismiss(item.id).await?;
        self.emit_updated(id).await?;
        Ok(())
    }

    /// Unread, non-dismissed item count.
    pub async fn badge_count(&self, user_id: &str) -> Result<usize, InboxError> {
        Ok(self.repo.count_unread(user_id).await?)
    }

    /// Map a dispatched message onto an inbox item.
    pub async fn deliver_from_message(&self, message: &Message) -> Result<InboxItem, InboxError> {
        self.create(CreateInboxItem {
            user_id: message.receiver.clone(),
            message_id: Some(message.id),
            title: message.subject.clone(),
            body: message.body.clone(),
            locale: Some(message.locale.clone()),
            action_url: message.metadata_str("action_url").map(String::from),
            pinned: false,
            metadata: Some(message.metadata.clone()),
        })
        .await
    }

    async fn owned(&self, user_id: &str, id: Uuid) -> Result<Option<InboxItem>, InboxError> {
        let item = self.repo.get(id).await?;
        Ok(item.filter(|item| item.user_id == user_id))
    }

    async fn emit_updated(&self, id: Uuid) -> Result<(), InboxError> {
        if let Some(item) = self.repo.get(id).await? {
            self.emit(TOPIC_INBOX_UPDATED, &item).await;
        }
        Ok(())
    }

    async fn emit(&self, topic: &str, item: &InboxItem) {
        let event = BroadcastEvent::for_user(
            topic,
            item.user_id.clone(),
            json!({
                "id": item.id,
                "user_id": item.user_id,
                "title": item.title,
                "unread": item.unread,
                "dismissed": item.is_dismissed(),
                "snoozed_at": item.snoozed_until,
            }),
        );
        if let Err(e) = self.broadcaster.broadcast(event).await {
            tracing::warn!(topic, error = %e, "Inbox broadcast failed");
        }
    }
}
