//! Remote source abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use indexmirror_protocol::{Checkpoint, Payload};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A remote source of subgraph payloads.
///
/// Implementations own retry and timeout handling: an `Err` is terminal for
/// the call, and an `Ok` payload always carries a checkpoint.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches a full snapshot with up to `page_size` rows per collection.
    async fn fetch_full(&self, page_size: u32) -> SyncResult<Payload>;

    /// Fetches everything changed after `since`.
    async fn fetch_delta(&self, since: Checkpoint) -> SyncResult<Payload>;

    /// Fetches only the checkpoint the remote is currently at.
    async fn current_checkpoint(&self) -> SyncResult<Checkpoint>;
}

#[async_trait]
impl<S: RemoteSource + ?Sized> RemoteSource for Arc<S> {
    async fn fetch_full(&self, page_size: u32) -> SyncResult<Payload> {
        (**self).fetch_full(page_size).await
    }

    async fn fetch_delta(&self, since: Checkpoint) -> SyncResult<Payload> {
        (**self).fetch_delta(since).await
    }

    async fn current_checkpoint(&self) -> SyncResult<Checkpoint> {
        (**self).current_checkpoint().await
    }
}

/// A scripted response for [`MockSource`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this payload.
    Payload(Payload),
    /// Fail with a remote error carrying this message.
    Fail(String),
}

impl MockResponse {
    fn into_result(self) -> SyncResult<Payload> {
        match self {
            MockResponse::Payload(payload) => Ok(payload),
            MockResponse::Fail(message) => Err(SyncError::Remote(message)),
        }
    }
}

/// A scripted source for testing.
///
/// Responses are consumed in order; the last response of each queue is
/// sticky and repeats once it is the only one left.
#[derive(Debug, Default)]
pub struct MockSource {
    full: Mutex<VecDeque<MockResponse>>,
    delta: Mutex<VecDeque<MockResponse>>,
    latency: Mutex<Duration>,
    full_calls: AtomicUsize,
    delta_calls: AtomicUsize,
    last_since: Mutex<Option<Checkpoint>>,
}

impl MockSource {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a full-snapshot response.
    pub fn push_full(&self, response: MockResponse) {
        self.full.lock().push_back(response);
    }

    /// Queues a delta response.
    pub fn push_delta(&self, response: MockResponse) {
        self.delta.lock().push_back(response);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of `fetch_full` calls so far.
    pub fn full_calls(&self) -> usize {
        self.full_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_delta` calls so far.
    pub fn delta_calls(&self) -> usize {
        self.delta_calls.load(Ordering::SeqCst)
    }

    /// The `since` argument of the most recent delta call.
    pub fn last_since(&self) -> Option<Checkpoint> {
        *self.last_since.lock()
    }

    async fn respond(&self, queue: &Mutex<VecDeque<MockResponse>>, what: &str) -> SyncResult<Payload> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let next = {
            let mut queue = queue.lock();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        next.ok_or_else(|| SyncError::MalformedPayload(format!("no scripted {what} response")))?
            .into_result()
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn fetch_full(&self, _page_size: u32) -> SyncResult<Payload> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.full, "snapshot").await
    }

    async fn fetch_delta(&self, since: Checkpoint) -> SyncResult<Payload> {
        self.delta_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock() = Some(since);
        self.respond(&self.delta, "delta").await
    }

    async fn current_checkpoint(&self) -> SyncResult<Checkpoint> {
        let payload = self.respond(&self.delta, "delta").await?;
        payload
            .checkpoint()
            .ok_or_else(|| SyncError::MalformedPayload("no checkpoint".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_in_order() {
        let source = MockSource::new();
        source.push_delta(MockResponse::Fail("first".into()));
        source.push_delta(MockResponse::Payload(Payload::new(Some(7))));

        assert!(matches!(source.fetch_delta(1).await, Err(SyncError::Remote(_))));
        assert_eq!(source.fetch_delta(2).await.unwrap().checkpoint(), Some(7));
        // Last response is sticky.
        assert_eq!(source.fetch_delta(3).await.unwrap().checkpoint(), Some(7));
        assert_eq!(source.delta_calls(), 3);
        assert_eq!(source.last_since(), Some(3));
        assert_eq!(source.current_checkpoint().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn empty_script_fails() {
        let source = MockSource::new();
        assert!(source.fetch_full(10).await.is_err());
        assert_eq!(source.full_calls(), 1);
    }

    #[tokio::test]
    async fn shared_source_delegates() {
        let source = Arc::new(MockSource::new());
        source.push_full(MockResponse::Payload(Payload::new(Some(1))));
        let shared: Arc<MockSource> = Arc::clone(&source);
        assert!(shared.fetch_full(1).await.is_ok());
        assert_eq!(source.full_calls(), 1);
    }
}
