//! GraphQL-over-HTTP source.
//!
//! The HTTP client is abstracted behind [`HttpClient`] so the retry and
//! decoding logic can be exercised without a network. [`ReqwestClient`] is
//! the production implementation.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::source::RemoteSource;
use async_trait::async_trait;
use indexmirror_protocol::{Checkpoint, GraphqlRequest, GraphqlResponse, Payload};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client abstraction.
///
/// Implementations map non-success status codes to [`SyncError::Http`] and
/// network failures to [`SyncError::Transport`] or [`SyncError::Timeout`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request and returns the response body.
    async fn post_json(&self, url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>>;
}

/// A [`RemoteSource`] speaking GraphQL over HTTP.
pub struct GraphqlSource<C: HttpClient> {
    endpoint: String,
    client: C,
    retry: RetryConfig,
}

impl<C: HttpClient> GraphqlSource<C> {
    /// Creates a source for `endpoint`.
    pub fn new(endpoint: impl Into<String>, client: C, retry: RetryConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            retry,
        }
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn attempt(&self, body: &[u8]) -> SyncResult<Payload> {
        let bytes = self.client.post_json(&self.endpoint, body.to_vec()).await?;
        let payload = GraphqlResponse::from_slice(&bytes)?.into_payload()?;
        Ok(payload)
    }

    /// Runs `request` with the fixed-delay retry policy.
    async fn execute(&self, request: &GraphqlRequest, operation: &'static str) -> SyncResult<Payload> {
        let body = request
            .to_body()
            .map_err(|e| SyncError::transport_fatal(format!("failed to encode request: {e}")))?;
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(self.retry.attempt_timeout, self.attempt(&body)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout),
            };

            match result {
                Ok(payload) => {
                    debug!(operation, attempt = attempt + 1, records = payload.record_count(), "query succeeded");
                    return Ok(payload);
                }
                Err(err) => {
                    warn!(operation, attempt = attempt + 1, attempts, error = %err, "query attempt failed");
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts,
            last_error: Box::new(last_error.unwrap_or(SyncError::Timeout)),
        })
    }
}

#[async_trait]
impl<C: HttpClient> RemoteSource for GraphqlSource<C> {
    async fn fetch_full(&self, page_size: u32) -> SyncResult<Payload> {
        self.execute(&GraphqlRequest::full_snapshot(page_size), "full snapshot")
            .await
    }

    async fn fetch_delta(&self, since: Checkpoint) -> SyncResult<Payload> {
        self.execute(&GraphqlRequest::delta(since), "delta").await
    }

    async fn current_checkpoint(&self) -> SyncResult<Checkpoint> {
        let payload = self
            .execute(&GraphqlRequest::checkpoint(), "checkpoint")
            .await?;
        payload
            .checkpoint()
            .ok_or_else(|| SyncError::MalformedPayload("no checkpoint".into()))
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client sending `user_agent`, with an overall request
    /// timeout of `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post_json(&self, url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}
