//! HTTP client for the session server.
//!
//! Used by faculty commands, by the dashboard driver and, through
//! [`SampleSink`], by the student capture loop.

use crate::capture::{SampleSink, SubmitError};
use crate::core::{
    AggregateSnapshot, AttendanceSummary, CurrentLive, EmotionLabel, EndedSession, GroupId,
    SampleSubmission, SessionId, StartedSession,
};
use crate::protocol::{
    ErrorResponse, HealthResponse, ScheduleRequest, ScheduleResponse, ScheduledSessionInfo,
    ScheduledSessionsResponse, StartInstantRequest, SubmitSampleRequest, SubmitSampleResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://127.0.0.1:5000`
    pub base_url: String,
    /// Timeout applied to every request
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Client error types.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network/HTTP error
    #[error("network error: {0}")]
    Network(String),
    /// Another session for the group is already live
    #[error("group already has a live session: {0}")]
    GroupAlreadyLive(String),
    /// The session is not accepting data
    #[error("session is not live: {0}")]
    SessionNotLive(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// Server returned any other error response
    #[error("server error ({status}, {code}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    fn from_response(status: u16, body: ErrorResponse) -> Self {
        match body.code.as_str() {
            "GROUP_ALREADY_LIVE" => ClientError::GroupAlreadyLive(body.error),
            "SESSION_NOT_LIVE" => ClientError::SessionNotLive(body.error),
            "SESSION_NOT_FOUND" => ClientError::SessionNotFound(body.error),
            _ => ClientError::Server {
                status,
                code: body.code,
                message: body.error,
            },
        }
    }
}

/// Async client for the session server.
#[derive(Debug, Clone)]
pub struct SessionClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Test connection to the server.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get("/health").await
    }

    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<SessionId, ClientError> {
        let response: ScheduleResponse = self.post("/sessions/schedule", Some(request)).await?;
        Ok(response.session_id)
    }

    pub async fn start_instant(
        &self,
        group_id: GroupId,
        topic: &str,
    ) -> Result<StartedSession, ClientError> {
        let request = StartInstantRequest {
            group_id,
            topic: topic.to_string(),
        };
        self.post("/sessions/start_instant", Some(&request)).await
    }

    pub async fn start_scheduled(&self, session_id: SessionId) -> Result<StartedSession, ClientError> {
        self.post::<(), _>(&format!("/sessions/{session_id}/start"), None)
            .await
    }

    pub async fn end_session(&self, session_id: SessionId) -> Result<EndedSession, ClientError> {
        self.post::<(), _>(&format!("/sessions/{session_id}/end"), None)
            .await
    }

    pub async fn submit_sample(&self, sample: SampleSubmission) -> Result<EmotionLabel, ClientError> {
        let path = format!("/sessions/{}/samples", sample.session_id);
        let request = SubmitSampleRequest::from(sample);
        let response: SubmitSampleResponse = self.post(&path, Some(&request)).await?;
        Ok(response.emotion_label)
    }

    pub async fn snapshot(&self, session_id: SessionId) -> Result<AggregateSnapshot, ClientError> {
        self.get(&format!("/sessions/{session_id}/snapshot")).await
    }

    pub async fn summary(&self, session_id: SessionId) -> Result<AttendanceSummary, ClientError> {
        self.get(&format!("/sessions/{session_id}/summary")).await
    }

    pub async fn current_live(&self, group_id: GroupId) -> Result<CurrentLive, ClientError> {
        self.get(&format!("/groups/{group_id}/current")).await
    }

    pub async fn scheduled_sessions(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<ScheduledSessionInfo>, ClientError> {
        let response: ScheduledSessionsResponse =
            self.get(&format!("/groups/{group_id}/scheduled")).await?;
        Ok(response.scheduled_sessions)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .client
            .get(self.config.url(path))
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut request = self.client.post(self.config.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(body) => ClientError::from_response(status.as_u16(), body),
                Err(_) => ClientError::Server {
                    status: status.as_u16(),
                    code: "UNKNOWN".to_string(),
                    message: text,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

impl SampleSink for SessionClient {
    async fn submit(&self, sample: SampleSubmission) -> Result<EmotionLabel, SubmitError> {
        self.submit_sample(sample).await.map_err(|e| match e {
            ClientError::SessionNotLive(_) => SubmitError::SessionNotLive,
            other => SubmitError::Transient(other.to_string()),
        })
    }
}

/// Identifier for this device, used in capture logs.
pub fn device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("capture-{}-{}", hostname, &uuid::Uuid::new_v4().to_string()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_url() {
        let config = ClientConfig::new("http://127.0.0.1:5000/");
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(
            config.url("/sessions/3/snapshot"),
            "http://127.0.0.1:5000/sessions/3/snapshot"
        );
    }

    #[test]
    fn test_error_code_decoding() {
        let err = ClientError::from_response(
            400,
            ErrorResponse {
                error: "session 3 is not currently live".to_string(),
                code: "SESSION_NOT_LIVE".to_string(),
            },
        );
        assert!(matches!(err, ClientError::SessionNotLive(_)));

        let err = ClientError::from_response(
            409,
            ErrorResponse {
                error: "nope".to_string(),
                code: "INVALID_TRANSITION".to_string(),
            },
        );
        assert!(matches!(err, ClientError::Server { status: 409, .. }));
    }

    #[test]
    fn test_device_id_format() {
        let id = device_id();
        assert!(id.starts_with("capture-"));
    }
}
