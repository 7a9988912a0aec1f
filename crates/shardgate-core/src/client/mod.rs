//! One-shot HTTP calls to observer nodes.
//!
//! The caller performs exactly one GET or POST per invocation; retry and
//! fallback across peer observers belong to the processors. The HTTP status
//! is surfaced separately from transport failure so callers can apply the
//! skip/authoritative decision table.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::errors::ProcessError;

/// HTTP statuses an observer answers with when it is effectively down
/// (route not served, or it did not respond in time). Callers skip to the
/// next observer on these.
#[must_use]
pub fn is_observer_unavailable(status: u16) -> bool {
    status == 404 || status == 408
}

/// A failure below the HTTP layer: the observer never produced a
/// classifiable status, or produced a body that is not JSON.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallError {
    /// The request exceeded the configured per-call timeout.
    #[error("request timed out")]
    Timeout,

    /// DNS, TCP or TLS failure before any status was received.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The observer answered but the body is not parseable JSON.
    #[error("response decode failed: {0}")]
    Decode(String),
}

/// An observer's reply: HTTP status plus the raw JSON body.
///
/// Non-2xx replies keep their (possibly empty) body so callers can surface
/// the observer's error envelope.
#[derive(Debug, Clone)]
pub struct ObserverReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ObserverReply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body into the expected reply shape.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::InvalidObserverResponse`] when the body does
    /// not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProcessError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ProcessError::InvalidObserverResponse(e.to_string()))
    }

    /// The `error` field of the observer's reply envelope, if any.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.body
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// The seam between processors and the network.
///
/// Processors hold an `Arc<dyn ObserverCaller>` and are exercised in tests
/// against stub implementations.
#[async_trait]
pub trait ObserverCaller: Send + Sync {
    /// One GET against `base_url` + `path`.
    async fn get(&self, base_url: &str, path: &str) -> Result<ObserverReply, CallError>;

    /// One POST of a JSON body against `base_url` + `path`.
    async fn post(
        &self,
        base_url: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ObserverReply, CallError>;
}

/// Production [`ObserverCaller`] backed by a pooled reqwest client.
pub struct HttpCaller {
    client: Client,
    timeout: Duration,
}

impl HttpCaller {
    /// Creates a caller with the given per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Connection`] if the underlying client fails to
    /// build.
    pub fn new(timeout: Duration) -> Result<Self, CallError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("shardgate/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                CallError::Connection(format!("http client build failed: {e}"))
            })?;

        Ok(Self { client, timeout })
    }

    fn classify(error: &reqwest::Error) -> CallError {
        if error.is_timeout() {
            CallError::Timeout
        } else if error.is_connect() {
            CallError::Connection("connection refused or unreachable".to_string())
        } else {
            CallError::Connection("network error".to_string())
        }
    }

    async fn read_reply(response: reqwest::Response) -> Result<ObserverReply, CallError> {
        let status = response.status().as_u16();
        let raw = response.bytes().await.map_err(|e| Self::classify(&e))?;

        let body = if raw.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&raw).map_err(|e| CallError::Decode(e.to_string()))?
        };

        Ok(ObserverReply { status, body })
    }
}

#[async_trait]
impl ObserverCaller for HttpCaller {
    async fn get(&self, base_url: &str, path: &str) -> Result<ObserverReply, CallError> {
        let url = format!("{base_url}{path}");
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        Self::read_reply(response).await
    }

    async fn post(
        &self,
        base_url: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ObserverReply, CallError> {
        let url = format!("{base_url}{path}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        Self::read_reply(response).await
    }
}
