//! Digest batch accumulation
//!
//! Batches are process-local state keyed by `definition_code:digest_key`. The
//! map lives behind a mutex and supports exactly two operations: append (which
//! reports whether the batch is new, so exactly one deferred job is enqueued
//! per batch) and an atomic pop when the digest fires.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::IntakeRequest;

#[derive(Debug, Clone)]
pub struct DigestBatch {
    pub requests: Vec<IntakeRequest>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DigestBuffer {
    batches: Mutex<HashMap<String, DigestBatch>>,
}

impl DigestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the batch for `key`. Returns `true` when this
    /// request created the batch.
    pub fn add(&self, key: &str, request: IntakeRequest) -> bool {
        let mut batches = self.batches.lock();
        match batches.get_mut(key) {
            Some(batch) => {
                batch.requests.push(request);
                false
            }
            None => {
                batches.insert(
                    key.to_string(),
                    DigestBatch {
                        requests: vec![request],
                        created_at: Utc::now(),
                    },
                );
                true
            }
        }
    }

    /// Remove and return the batch for `key`.
    pub fn pop(&self, key: &str) -> Option<DigestBatch> {
        self.batches.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}
