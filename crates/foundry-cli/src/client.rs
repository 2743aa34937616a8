//! HTTP client for a running proxy.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use foundry_client::{AuthDiagnostics, HealthReport};
use foundry_common::{ChatPayload, ForwardResponse};

/// Proxy address used when none is given.
pub const DEFAULT_PROXY_URL: &str = "http://localhost:3001";

/// Result of `POST /api/chat`.
#[derive(Debug)]
pub enum ChatOutcome {
    /// The agent answered.
    Reply(ForwardResponse),
    /// The proxy answered with an error body.
    Failed {
        /// HTTP status.
        status: u16,
        /// Error body.
        body: Value,
    },
}

/// Client for the proxy's HTTP API.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    /// Creates a client for the proxy at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Proxy address without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fetches `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unreachable or answers with an error.
    pub async fn health(&self) -> Result<HealthReport> {
        self.get_json("/health").await
    }

    /// Fetches `GET /diagnose-auth`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unreachable or answers with an error.
    pub async fn diagnose_auth(&self) -> Result<AuthDiagnostics> {
        self.get_json("/diagnose-auth").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Proxy server is not reachable at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{path} responded with HTTP {}", status.as_u16());
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid response from {path}"))
    }

    /// Sends a conversation to `POST /api/chat`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unreachable or its answer is not JSON.
    /// Error statuses with a JSON body are returned as [`ChatOutcome::Failed`].
    pub async fn chat(&self, payload: &ChatPayload) -> Result<ChatOutcome> {
        let url = self.url("/api/chat");
        debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Proxy server is not reachable at {}", self.base_url))?;

        let status = response.status();
        let body: Value = response.json().await.with_context(|| {
            format!("Invalid response from /api/chat (HTTP {})", status.as_u16())
        })?;

        if status.is_success() {
            let reply = serde_json::from_value(body).context("Unexpected reply shape")?;
            Ok(ChatOutcome::Reply(reply))
        } else {
            Ok(ChatOutcome::Failed {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use foundry_common::{AuthMode, ChatMessage};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn client(base_url: &str) -> ProxyClient {
        ProxyClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    /// Address of a port nothing listens on.
    pub fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "timestamp": "2025-01-01T00:00:00Z",
                "auth": "Entra ID",
                "endpoint": "https://agent.example.com/responses"
            })))
            .mount(&server)
            .await;

        let health = client(&format!("{}/", server.uri())).health().await.unwrap();
        assert_eq!(health.auth, AuthMode::EntraId);
        assert_eq!(health.endpoint, "https://agent.example.com/responses");
    }

    #[tokio::test]
    async fn test_health_error_status() {
        let server = MockServer::start().await;
        Mock::given(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server.uri()).health().await.unwrap_err();
        assert_eq!(err.to_string(), "/health responded with HTTP 500");
    }

    #[tokio::test]
    async fn test_unreachable_proxy() {
        let url = closed_port_url();
        let err = client(&url).health().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Proxy server is not reachable at {url}")
        );
    }

    #[tokio::test]
    async fn test_chat_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "endpoint": "https://other.example.com/responses"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"text": "hello", "raw": {"output": "hello"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = ChatPayload::from_messages(
            &[ChatMessage::user("hi")],
            Some("https://other.example.com/responses".to_string()),
        );
        match client(&server.uri()).chat(&payload).await.unwrap() {
            ChatOutcome::Reply(reply) => assert_eq!(reply.text, "hello"),
            ChatOutcome::Failed { status, .. } => panic!("unexpected failure {status}"),
        }
    }

    #[tokio::test]
    async fn test_chat_failure_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": "HTTP 401: Unauthorized"})),
            )
            .mount(&server)
            .await;

        let payload = ChatPayload::from_messages(&[ChatMessage::user("hi")], None);
        match client(&server.uri()).chat(&payload).await.unwrap() {
            ChatOutcome::Failed { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body["error"], "HTTP 401: Unauthorized");
            }
            ChatOutcome::Reply(_) => panic!("expected failure"),
        }
    }
}
