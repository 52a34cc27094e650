//! HTTP session-gateway provider
//!
//! Network-backed implementation of [`MessagingProvider`] against a session
//! gateway speaking JSON over REST:
//!
//! ```text
//! POST   {base}/sessions                    -> { "sessionId": "..." }
//! GET    {base}/sessions/{id}/status        -> SessionStatus
//! GET    {base}/sessions/{id}/messages      -> MessageBatch
//! POST   {base}/sessions/{id}/messages      -> { "messageId": "..." }
//! DELETE {base}/sessions/{id}               -> 204
//! ```
//!
//! Gateway status codes map onto the provider error taxonomy: 404 means the
//! session is unknown, 410 means it expired, 401/403 mean unauthenticated,
//! 402/422 mean the request was rejected, and everything retryable (408,
//! 429, 5xx, transport faults) surfaces as unavailable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    MessageBatch, MessagingProvider, ProviderError, ProviderResult, SessionStatus,
};

/// Configuration for the HTTP gateway provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Gateway base URL, e.g. `https://gateway.example.com/api`
    pub base_url: Url,
    /// Bearer token attached to every request, if the gateway requires one
    pub api_token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl HttpProviderConfig {
    /// Create a configuration with default timeouts
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set the bearer token
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// [`MessagingProvider`] backed by a session gateway over HTTP
pub struct HttpProvider {
    base: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Build the provider and its connection pool
    pub fn new(config: HttpProviderConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport { reason: e.to_string() })?;
        Ok(Self {
            base: base_from(&config.base_url),
            api_token: config.api_token,
            client,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest<'a> {
    number_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    peer_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: String,
}

#[async_trait]
impl MessagingProvider for HttpProvider {
    async fn initiate_session(&self, number_id: &str) -> ProviderResult<String> {
        let url = format!("{}/sessions", self.base);
        let response = self
            .authorize(self.client.post(&url))
            .json(&InitiateRequest { number_id })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            // No session exists yet, so a failure here is the gateway being
            // unable to serve us rather than a stale handle
            let status = response.status();
            let reason = response_detail(response, status).await;
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::NotAuthenticated,
                _ => ProviderError::Unavailable { reason },
            });
        }

        let body: InitiateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { reason: e.to_string() })?;
        if body.session_id.is_empty() {
            return Err(ProviderError::InvalidResponse {
                reason: "gateway returned an empty session id".to_string(),
            });
        }
        Ok(body.session_id)
    }

    async fn poll_status(&self, session_id: &str) -> ProviderResult<SessionStatus> {
        let url = format!("{}/sessions/{}/status", self.base, session_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, session_id).await);
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { reason: e.to_string() })
    }

    async fn poll_messages(&self, session_id: &str) -> ProviderResult<MessageBatch> {
        let url = format!("{}/sessions/{}/messages", self.base, session_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, session_id).await);
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { reason: e.to_string() })
    }

    async fn send_message(
        &self,
        session_id: &str,
        peer_id: &str,
        text: &str,
    ) -> ProviderResult<String> {
        let url = format!("{}/sessions/{}/messages", self.base, session_id);
        let response = self
            .authorize(self.client.post(&url))
            .json(&SendRequest { peer_id, text })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, session_id).await);
        }
        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse { reason: e.to_string() })?;
        Ok(body.message_id)
    }

    async fn terminate_session(&self, session_id: &str) -> ProviderResult<()> {
        let url = format!("{}/sessions/{}", self.base, session_id);
        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .map_err(transport_error)?;

        // A session the gateway no longer knows is already terminated
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(failure(response, session_id).await)
    }
}

fn base_from(base_url: &Url) -> String {
    base_url.as_str().trim_end_matches('/').to_string()
}

async fn failure(response: reqwest::Response, session_id: &str) -> ProviderError {
    let status = response.status();
    let detail = response_detail(response, status).await;
    classify_response(status, session_id, detail)
}

async fn response_detail(response: reqwest::Response, status: StatusCode) -> String {
    response
        .text()
        .await
        .ok()
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| format!("gateway returned {}", status))
}

fn classify_response(status: StatusCode, session_id: &str, reason: String) -> ProviderError {
    match status.as_u16() {
        404 => ProviderError::SessionNotFound { session_id: session_id.to_string() },
        410 => ProviderError::SessionExpired,
        401 | 403 => ProviderError::NotAuthenticated,
        402 | 422 => ProviderError::Rejected { reason },
        408 | 429 => ProviderError::Unavailable { reason },
        code if code >= 500 => ProviderError::Unavailable { reason },
        _ => ProviderError::InvalidResponse { reason },
    }
}

fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Unavailable { reason: "request timed out".to_string() }
    } else {
        ProviderError::Transport { reason: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: u16) -> ProviderError {
        classify_response(
            StatusCode::from_u16(code).unwrap(),
            "sess-1",
            "detail".to_string(),
        )
    }

    #[test]
    fn gateway_statuses_map_to_the_error_taxonomy() {
        assert!(matches!(classify(404), ProviderError::SessionNotFound { .. }));
        assert!(matches!(classify(410), ProviderError::SessionExpired));
        assert!(matches!(classify(401), ProviderError::NotAuthenticated));
        assert!(matches!(classify(403), ProviderError::NotAuthenticated));
        assert!(matches!(classify(402), ProviderError::Rejected { .. }));
        assert!(matches!(classify(422), ProviderError::Rejected { .. }));
        assert!(matches!(classify(429), ProviderError::Unavailable { .. }));
        assert!(matches!(classify(503), ProviderError::Unavailable { .. }));
        assert!(matches!(classify(418), ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn terminal_mapping_matches_loop_expectations() {
        assert!(classify(404).is_terminal());
        assert!(classify(410).is_terminal());
        assert!(classify(401).is_terminal());
        assert!(classify(503).is_transient());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let with_slash = Url::parse("https://gw.example.com/api/").unwrap();
        let without = Url::parse("https://gw.example.com/api").unwrap();
        assert_eq!(base_from(&with_slash), "https://gw.example.com/api");
        assert_eq!(base_from(&without), "https://gw.example.com/api");
    }

    #[test]
    fn request_bodies_use_the_gateway_dialect() {
        let body = serde_json::to_string(&InitiateRequest { number_id: "num-1" }).unwrap();
        assert_eq!(body, r#"{"numberId":"num-1"}"#);

        let body = serde_json::to_string(&SendRequest { peer_id: "+1555", text: "hi" }).unwrap();
        assert_eq!(body, r#"{"peerId":"+1555","text":"hi"}"#);
    }
}
