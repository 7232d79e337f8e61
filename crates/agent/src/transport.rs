//! How an agent reaches the presence endpoint.

use std::time::Duration;

use async_trait::async_trait;
use viewdeck_protocol::{
    ErrorResponse, PresenceMutationResponse, PresenceRequest, PresenceSnapshotResponse,
};

use crate::error::AgentError;

/// Carries presence requests to a server.
///
/// Implementations only move bytes; the agent decides what a response means
/// for its local view.
#[async_trait]
pub trait PresenceTransport: Send + Sync + 'static {
    /// Submit one join/leave/heartbeat.
    async fn send(&self, request: &PresenceRequest) -> Result<PresenceMutationResponse, AgentError>;

    /// Fetch presence for every stream.
    async fn snapshot(&self) -> Result<PresenceSnapshotResponse, AgentError>;
}

/// JSON over HTTP against `/api/presence`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/presence", self.base_url.trim_end_matches('/'))
    }

    async fn decode<R: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, AgentError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(AgentError::Rejected {
                status: status.as_u16(),
                error,
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl PresenceTransport for HttpTransport {
    async fn send(&self, request: &PresenceRequest) -> Result<PresenceMutationResponse, AgentError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn snapshot(&self) -> Result<PresenceSnapshotResponse, AgentError> {
        let response = self.client.get(self.endpoint()).send().await?;
        Self::decode(response).await
    }
}
