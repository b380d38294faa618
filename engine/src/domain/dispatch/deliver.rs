//! Bounded-retry delivery to one messenger
//!
//! Each attempt is recorded as an append-only delivery attempt row with a
//! strictly increasing index. Backoff is linear (`attempt * base delay`) and
//! cancellation short-circuits between attempts and during backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::data::repos::AttemptRepo;
use crate::data::types::DeliveryAttempt;
use crate::domain::messenger::{Messenger, OutboundMessage};

use super::error::DispatchError;

/// Try a single messenger up to `max_retries` times.
///
/// Returns the successful attempt index, or the last transport error after
/// exhaustion. Attempt rows are written for every try, success and failure
/// alike.
pub(crate) async fn deliver_with_retries(
    attempts: &Arc<dyn AttemptRepo>,
    messenger: &Arc<dyn Messenger>,
    message_id: Uuid,
    outbound: &OutboundMessage,
    max_retries: u32,
    base_delay: Duration,
    cancel: &CancellationToken,
) -> Result<u32, DispatchError> {
    let adapter = outbound.provider.clone();
    let mut last_error = String::new();

    for attempt in 1..=max_retries.max(1) {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        match messenger.send(outbound).await {
            Ok(()) => {
                attempts
                    .create(&DeliveryAttempt::succeeded(message_id, &adapter, attempt))
                    .await?;
                tracing::debug!(
                    message_id = %message_id,
                    adapter = %adapter,
                    attempt,
                    "Delivery succeeded"
                );
                return Ok(attempt);
            }
            Err(e) => {
                let text = e.to_string();
                attempts
                    .create(&DeliveryAttempt::failed(message_id, &adapter, attempt, &text))
                    .await?;
                tracing::debug!(
                    message_id = %message_id,
                    adapter = %adapter,
                    attempt,
                    error = %text,
                    "Delivery attempt failed"
                );
                last_error = text;

                let backoff = base_delay * attempt;
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    Err(DispatchError::Transport {
        attempt: max_retries.max(1),
        message: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repos::memory::MemoryAttemptRepo;
    use crate::data::types::AttemptStatus;
    use crate::domain::messenger::{Capabilities, SendError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct FlakyMessenger {
        /// Successive results; `true` succeeds
        script: Mutex<Vec<bool>>,
    }

    impl FlakyMessenger {
        fn new(script: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.to_vec()),
            })
        }
    }

    #[async_trait]
    impl Messenger for FlakyMessenger {
        fn name(&self) -> &str {
            "flaky"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                name: "flaky".into(),
                channels: vec!["chat".into()],
                ..Default::default()
            }
        }

        async fn send(&self, _message: &OutboundMessage) -> Result<(), SendError> {
            let mut script = self.script.lock();
            if script.is_empty() || script.remove(0) {
                Ok(())
            } else {
                Err(SendError::Transport("boom".into()))
            }
        }
    }

    fn outbound(message_id: Uuid) -> OutboundMessage {
        let mut message = crate::data::types::Message::new(Uuid::new_v4(), "chat", "bob");
        message.id = message_id;
        OutboundMessage::from_message(&message, "flaky")
    }

    fn attempts_repo() -> Arc<dyn AttemptRepo> {
        Arc::new(MemoryAttemptRepo::new())
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let attempts = attempts_repo();
        let messenger: Arc<dyn Messenger> = FlakyMessenger::new(&[true]);
        let message_id = Uuid::new_v4();

        let attempt = deliver_with_retries(
            &attempts,
            &messenger,
            message_id,
            &outbound(message_id),
            3,
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(attempt, 1);
        let rows = attempts.list_by_message(message_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttemptStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let attempts = attempts_repo();
        let messenger: Arc<dyn Messenger> = FlakyMessenger::new(&[false, false, true]);
        let message_id = Uuid::new_v4();

        let attempt = deliver_with_retries(
            &attempts,
            &messenger,
            message_id,
            &outbound(message_id),
            3,
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(attempt, 3);
        let rows = attempts.list_by_message(message_id).await.unwrap();
        let statuses: Vec<AttemptStatus> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AttemptStatus::Failed, AttemptStatus::Failed, AttemptStatus::Succeeded]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_records_all_attempts_with_backoff() {
        let attempts = attempts_repo();
        let messenger: Arc<dyn Messenger> = FlakyMessenger::new(&[false, false, false]);
        let message_id = Uuid::new_v4();

        let started = Instant::now();
        let err = deliver_with_retries(
            &attempts,
            &messenger,
            message_id,
            &outbound(message_id),
            3,
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, DispatchError::Transport { attempt: 3, .. }));
        // Linear backoff: 100ms + 200ms + 300ms, with scheduling slack
        assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");

        let rows = attempts.list_by_message(message_id).await.unwrap();
        assert_eq!(rows.len(), 3);
        let indices: Vec<u32> = rows.iter().map(|r| r.attempt).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(rows.iter().all(|r| r.status == AttemptStatus::Failed));
        assert!(rows.iter().all(|r| r.error.as_deref() == Some("transport error: boom")));
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let attempts = attempts_repo();
        let messenger: Arc<dyn Messenger> = FlakyMessenger::new(&[false, false, false]);
        let message_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let task = {
            let attempts = Arc::clone(&attempts);
            let messenger = Arc::clone(&messenger);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                deliver_with_retries(
                    &attempts,
                    &messenger,
                    message_id,
                    &outbound(message_id),
                    3,
                    Duration::from_secs(5),
                    &cancel,
                )
                .await
            })
        };

        // Cancel during the first backoff sleep
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("prompt cancellation")
            .unwrap();
        assert!(matches!(result, Err(DispatchError::Cancelled)));
        assert_eq!(attempts.list_by_message(message_id).await.unwrap().len(), 1);
    }
}
