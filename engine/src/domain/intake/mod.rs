//! Intake service
//!
//! Front door of the engine: validates a request, then routes it to one of
//! three paths. Digest requests accumulate into a keyed batch with exactly one
//! deferred job per batch; future-scheduled requests are handed to the queue
//! without persisting; everything else persists an event and dispatches
//! synchronously.

pub mod digest;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::config::IntakeConfig;
use crate::data::queue::{Queue, QueueError, QueueJob};
use crate::data::repos::{DefinitionRepo, EventRepo, RepoError};
use crate::data::types::{Event, Metadata};
use crate::domain::dispatch::{DispatchError, DispatchOptions, Dispatcher};

use digest::DigestBuffer;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("bad queue payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Digest grouping: requests sharing a key within the delay window merge into
/// one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestOptions {
    pub key: String,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub definition_code: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub context: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Channel override; `None` uses the definition's channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestOptions>,
}

pub struct IntakeService {
    config: IntakeConfig,
    definitions: Arc<dyn DefinitionRepo>,
    events: Arc<dyn EventRepo>,
    queue: Arc<dyn Queue>,
    dispatcher: Arc<Dispatcher>,
    digests: DigestBuffer,
}

impl IntakeService {
    pub fn new(
        config: IntakeConfig,
        definitions: Arc<dyn DefinitionRepo>,
        events: Arc<dyn EventRepo>,
        queue: Arc<dyn Queue>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            definitions,
            events,
            queue,
            dispatcher,
            digests: DigestBuffer::new(),
        }
    }

    /// Accept a notification request: validate, then batch, defer, or
    /// dispatch now.
    pub async fn enqueue(
        &self,
        cancel: &CancellationToken,
        mut request: IntakeRequest,
    ) -> Result<(), IntakeError> {
        request.definition_code = request.definition_code.trim().to_string();
        if request.definition_code.is_empty() {
            return Err(IntakeError::Validation("definition_code is required".into()));
        }
        if request.recipients.is_empty() {
            return Err(IntakeError::Validation("at least one recipient is required".into()));
        }
        if self
            .definitions
            .get_by_code(&request.definition_code)
            .await?
            .is_none()
        {
            return Err(IntakeError::DefinitionNotFound(request.definition_code));
        }

        // Digest batching
        if let Some(digest) = request.digest.clone()
            && !digest.key.trim().is_empty()
        {
            let batch_key = format!("{}:{}", request.definition_code, digest.key.trim());
            let run_at = Utc::now() + Duration::seconds(digest.delay_secs as i64);
            let is_new = self.digests.add(&batch_key, request);
            if is_new {
                self.queue
                    .enqueue(QueueJob {
                        key: format!("digest:{}", batch_key),
                        payload: json!({ "key": batch_key }),
                        run_at,
                    })
                    .await?;
                tracing::debug!(batch = %batch_key, "Digest batch opened");
            } else {
                tracing::debug!(batch = %batch_key, "Appended to digest batch");
            }
            return Ok(());
        }

        // Future scheduling
        let grace = Duration::seconds(self.config.schedule_grace_secs);
        if let Some(at) = request.schedule_at
            && at > Utc::now() + grace
        {
            let payload = serde_json::to_value(&request)
                .map_err(|e| IntakeError::Payload(e.to_string()))?;
            self.queue
                .enqueue(QueueJob {
                    key: format!("event:{}:{}", request.definition_code, at.timestamp()),
                    payload,
                    run_at: at,
                })
                .await?;
            tracing::debug!(
                definition = %request.definition_code,
                run_at = %at,
                "Request scheduled"
            );
            return Ok(());
        }

        self.dispatch_now(cancel, request).await
    }

    /// Queue-runner entry for a scheduled request: re-enters the immediate
    /// path.
    pub async fn process_scheduled(
        &self,
        cancel: &CancellationToken,
        payload: Value,
    ) -> Result<(), IntakeError> {
        let request: IntakeRequest =
            serde_json::from_value(payload).map_err(|e| IntakeError::Payload(e.to_string()))?;
        if request.definition_code.trim().is_empty() || request.recipients.is_empty() {
            return Err(IntakeError::Payload("scheduled payload missing fields".into()));
        }
        self.dispatch_now(cancel, request).await
    }

    /// Queue-runner entry for a digest batch: merge the accumulated requests
    /// into one event and dispatch it.
    pub async fn process_digest(
        &self,
        cancel: &CancellationToken,
        batch_key: &str,
    ) -> Result<(), IntakeError> {
        let Some(batch) = self.digests.pop(batch_key) else {
            tracing::debug!(batch = %batch_key, "Digest batch already drained");
            return Ok(());
        };

        let mut requests = batch.requests.into_iter();
        let Some(mut merged) = requests.next() else {
            return Ok(());
        };
        let mut entries: Vec<Value> = vec![Value::Object(merged.context.clone())];
        for request in requests {
            for recipient in request.recipients {
                if !merged.recipients.contains(&recipient) {
                    merged.recipients.push(recipient);
                }
            }
            entries.push(Value::Object(request.context));
        }
        merged.context.insert(
            "digest".into(),
            json!({ "count": entries.len(), "entries": entries }),
        );
        merged.digest = None;
        merged.schedule_at = None;

        tracing::debug!(
            batch = %batch_key,
            recipients = merged.recipients.len(),
            "Dispatching merged digest"
        );
        self.dispatch_now(cancel, merged).await
    }

    /// Persist an event and dispatch it synchronously.
    async fn dispatch_now(
        &self,
        cancel: &CancellationToken,
        request: IntakeRequest,
    ) -> Result<(), IntakeError> {
        let mut event = Event::new(request.definition_code, request.recipients);
        event.tenant_id = request.tenant_id;
        event.actor_id = request.actor_id;
        event.context = request.context;
        self.events.create(&event).await?;

        self.dispatcher
            .dispatch(
                cancel,
                &event,
                DispatchOptions {
                    channels: request.channels,
                    locale: request.locale,
                },
            )
            .await?;
        Ok(())
    }
}
