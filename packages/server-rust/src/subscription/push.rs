//! Downstream bus protocol: batch delivery to subscriber endpoints.
//!
//! Each flush sends one JSON envelope
//! `{"subscription-id": ..., "batch": [record, ...]}` to the
//! subscription's endpoint. A 2xx response is success; anything else --
//! non-2xx status, transport error, or the per-attempt timeout -- is a
//! delivery failure handled by the flush retry/retire policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slookup_core::Record;
use thiserror::Error;

/// Wire envelope for one flush batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// Target subscription.
    #[serde(rename = "subscription-id")]
    pub subscription_id: String,
    /// Records in admission order.
    pub batch: Vec<Record>,
}

/// Delivery failure for one push attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// Endpoint answered with a non-2xx status.
    #[error("endpoint returned status {0}")]
    Status(u16),
    /// Network failure or per-attempt timeout.
    #[error("push transport failure: {0}")]
    Transport(String),
}

/// Outbound delivery client.
///
/// Used as `Arc<dyn PushClient>` so tests can substitute a recording
/// implementation.
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Delivers one envelope; a `2xx` response is the only success.
    async fn deliver(&self, endpoint: &str, envelope: &PushEnvelope) -> Result<(), PushError>;
}

/// HTTP POST delivery with a per-attempt timeout.
pub struct HttpPushClient {
    client: reqwest::Client,
}

impl HttpPushClient {
    /// Builds a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushClient for HttpPushClient {
    async fn deliver(&self, endpoint: &str, envelope: &PushEnvelope) -> Result<(), PushError> {
        let response = self
            .client
            .post(endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|err| PushError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PushError::Status(status.as_u16()))
        }
    }
}

/// Recording push client for tests: captures envelopes and can be told
/// to fail the next n attempts.
#[cfg(test)]
pub struct RecordingPushClient {
    /// Envelopes delivered so far, in order.
    pub deliveries: parking_lot::Mutex<Vec<PushEnvelope>>,
    /// Attempts left to fail before succeeding again.
    pub failures_remaining: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl RecordingPushClient {
    pub fn new() -> Self {
        Self {
            deliveries: parking_lot::Mutex::new(Vec::new()),
            failures_remaining: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, attempts: u32) {
        self.failures_remaining
            .store(attempts, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<PushEnvelope> {
        self.deliveries.lock().clone()
    }

    /// Waits until at least `count` envelopes have arrived.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.deliveries.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {count} deliveries, have {}",
            self.deliveries.lock().len()
        );
    }
}

#[cfg(test)]
#[async_trait]
impl PushClient for RecordingPushClient {
    async fn deliver(&self, _endpoint: &str, envelope: &PushEnvelope) -> Result<(), PushError> {
        use std::sync::atomic::Ordering;

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(PushError::Transport("injected failure".to_string()));
        }
        self.deliveries.lock().push(envelope.clone());
        Ok(())
    }
}
