//! Forwarding client for the Foundry agent endpoint.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use secrecy::ExposeSecret;

use foundry_common::client::{Config, ForwardRequest, ForwardResponse, InvalidPayload};

use crate::dns::{Resolver, SystemResolver, resolve_preferring_ipv4};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, classify_transport_error, parse_error_body, upstream_message};
use crate::token::{TokenCache, TokenManager};

use super::{UpstreamRequest, normalize};

/// Header carrying a static API key.
pub const API_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// Client that forwards chat conversations to a Foundry agent.
///
/// Cheap to clone; clones share the HTTP connection pool and token cache.
#[derive(Clone)]
pub struct FoundryClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: Arc<Config>,
    pub(crate) tokens: Arc<TokenManager>,
    pub(crate) resolver: Arc<dyn Resolver>,
}

impl std::fmt::Debug for FoundryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoundryClient")
            .field("endpoint", &self.config.endpoint)
            .field("auth", &self.config.credentials.auth_mode())
            .field("tokens", &self.tokens)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl FoundryClient {
    /// Creates a client with a fresh token cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        Self::with_cache(config, Arc::new(TokenCache::new()))
    }

    /// Creates a client that shares `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_cache(config: Config, cache: Arc<TokenCache>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().dns_resolver(Arc::new(SystemResolver));
        if let Some(timeout) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        let config = Arc::new(config);
        let tokens = TokenManager::new(http.clone(), Arc::clone(&config), cache);

        Ok(Self {
            http,
            config,
            tokens: Arc::new(tokens),
            resolver: Arc::new(SystemResolver),
        })
    }

    /// Replaces the resolver used for the DNS preflight.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the token manager.
    #[must_use]
    pub fn with_token_manager(mut self, tokens: TokenManager) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared configuration handle.
    #[must_use]
    pub const fn config_handle(&self) -> &Arc<Config> {
        &self.config
    }

    /// The underlying HTTP client.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The token manager.
    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Forwards a conversation and normalizes the reply.
    ///
    /// Runs validation, authentication, the DNS preflight and the upstream
    /// POST in that order; a failure at any step skips the rest.
    ///
    /// # Errors
    ///
    /// See [`ClientError`] for the failure classes and the HTTP status each
    /// maps to.
    pub async fn forward_chat(
        &self,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, ClientError> {
        if request.messages.is_empty() {
            return Err(ClientError::InvalidRequest(InvalidPayload::EmptyMessages.to_string()));
        }

        let endpoint = Endpoint::parse(request.endpoint_or(&self.config.endpoint))?;
        let endpoint_str = endpoint.to_string();
        debug!("Target endpoint: {endpoint_str}");

        let (auth_name, auth_value) = self.auth_header().await?;

        let addrs = resolve_preferring_ipv4(self.resolver.as_ref(), endpoint.host())
            .await
            .map_err(|e| {
                error!("DNS resolution error: {e}");
                ClientError::DnsResolution {
                    host: e.host,
                    endpoint: endpoint_str.clone(),
                    reason: e.reason,
                }
            })?;
        debug!("{} resolved to {addrs:?}", endpoint.host());

        let body = UpstreamRequest::from(request);
        info!(
            "Forwarding {} message(s) to {}",
            request.messages.len(),
            endpoint.base_url()
        );

        let response = self
            .http
            .post(endpoint.url().clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(auth_name, auth_value)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = classify_transport_error(&e, &endpoint_str, endpoint.host());
                error!("Proxy error: {err}");
                err
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &endpoint_str, endpoint.host()))?;

        if !status.is_success() {
            let details = parse_error_body(&text);
            error!(
                "Foundry API error: {} {details} (endpoint {endpoint_str})",
                status.as_u16()
            );

            return Err(if status.as_u16() == 401 {
                ClientError::UpstreamUnauthorized {
                    message: upstream_message(&details, "Authentication failed"),
                    details,
                }
            } else {
                ClientError::Upstream {
                    status: status.as_u16(),
                    message: upstream_message(&details, "API request failed"),
                    details,
                }
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            error!("Foundry API returned a non-JSON body: {e}");
            ClientError::InvalidResponse(e.to_string())
        })?;
        debug!("Foundry API response: {raw}");

        Ok(normalize(raw))
    }

    /// Chooses the authentication header.
    ///
    /// A configured API key always wins and never touches the token manager.
    async fn auth_header(&self) -> Result<(HeaderName, HeaderValue), ClientError> {
        let credentials = &self.config.credentials;

        if let Some(api_key) = credentials.api_key() {
            info!(
                "Using API key authentication ({} characters)",
                api_key.expose_secret().len()
            );
            return Ok((
                HeaderName::from_static(API_KEY_HEADER),
                sensitive_header(api_key.expose_secret())?,
            ));
        }

        if let Some(token) = self.tokens.access_token().await {
            info!("Using Entra ID authentication");
            return Ok((
                AUTHORIZATION,
                sensitive_header(&format!("Bearer {}", token.expose_secret()))?,
            ));
        }

        let missing = credentials.missing_oauth_fields();
        if missing.is_empty() {
            Err(ClientError::TokenUnavailable)
        } else {
            Err(ClientError::MissingCredentials { missing })
        }
    }
}

fn sensitive_header(value: &str) -> Result<HeaderValue, ClientError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        ClientError::Configuration("credential contains characters not allowed in a header".into())
    })?;
    header.set_sensitive(true);
    Ok(header)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::dns::DnsError;
    use crate::dns::tests::StaticResolver;
    use crate::error::UNAUTHORIZED_TROUBLESHOOTING;
    use foundry_common::ChatMessage;
    use foundry_common::client::Credentials;
    use foundry_common::ResponseShape;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AGENT_PATH: &str = "/api/projects/p/applications/a/protocols/openai/responses";

    fn endpoint(server: &MockServer) -> String {
        format!("{}{AGENT_PATH}", server.uri())
    }

    fn api_key_client(server: &MockServer) -> FoundryClient {
        let config = Config::new(endpoint(server))
            .with_authority_host(server.uri())
            .with_credentials(
                Credentials::default()
                    .with_api_key("test-key")
                    .with_client_credentials("tenant-1", "client-1", "secret"),
            );
        FoundryClient::new(config).unwrap()
    }

    fn oauth_client(server: &MockServer) -> FoundryClient {
        let config = Config::new(endpoint(server))
            .with_authority_host(server.uri())
            .with_credentials(Credentials::default().with_client_credentials(
                "tenant-1",
                "client-1",
                "secret",
            ));
        FoundryClient::new(config).unwrap()
    }

    fn hello() -> ForwardRequest {
        ForwardRequest::new(vec![ChatMessage::user("Hello")])
    }

    fn reply_body(text: &str) -> serde_json::Value {
        json!({
            "id": "resp_1",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": text}]
            }]
        })
    }

    #[tokio::test]
    async fn test_api_key_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(header("content-type", "application/json"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({
                "input": [{"role": "user", "content": "Hello"}],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let response = api_key_client(&server).forward_chat(&hello()).await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.shape, ResponseShape::OutputItems);
        assert_eq!(response.raw["id"], "resp_1");
    }

    #[tokio::test]
    async fn test_bearer_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "token-xyz"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .and(header("authorization", "Bearer token-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "hi"})))
            .expect(2)
            .mount(&server)
            .await;

        let client = oauth_client(&server);
        assert_eq!(client.forward_chat(&hello()).await.unwrap().text, "hi");
        // Second call reuses the cached token.
        assert_eq!(client.forward_chat(&hello()).await.unwrap().text, "hi");
    }

    #[tokio::test]
    async fn test_empty_conversation_is_rejected_before_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = api_key_client(&server)
            .forward_chat(&ForwardRequest::new(Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), InvalidPayload::EmptyMessages.to_string());
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = Config::new(endpoint(&server)).with_credentials(
            Credentials::default().with_client_credentials("tenant-1", "", ""),
        );
        let err = FoundryClient::new(config)
            .unwrap()
            .forward_chat(&hello())
            .await
            .unwrap_err();

        match err {
            ClientError::MissingCredentials { missing } => {
                assert_eq!(missing, vec!["AZURE_CLIENT_ID", "AZURE_CLIENT_SECRET"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_failure_is_token_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_client"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = oauth_client(&server).forward_chat(&hello()).await.unwrap_err();
        assert!(matches!(err, ClientError::TokenUnavailable));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_upstream_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": {"message": "bad token"}})),
            )
            .mount(&server)
            .await;

        let err = api_key_client(&server).forward_chat(&hello()).await.unwrap_err();
        match err {
            ClientError::UpstreamUnauthorized { message, details } => {
                assert_eq!(message, "bad token");
                assert_eq!(details["error"]["message"], "bad token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!UNAUTHORIZED_TROUBLESHOOTING.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_passthrough_with_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let err = api_key_client(&server).forward_chat(&hello()).await.unwrap_err();
        match err {
            ClientError::Upstream {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 503);
                assert_eq!(message, "API request failed");
                assert_eq!(details, json!({"error": "upstream overloaded"}));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let err = api_key_client(&server).forward_chat(&hello()).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_dns_failure_skips_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = api_key_client(&server).with_resolver(Arc::new(StaticResolver(Err(
            DnsError::new("127.0.0.1", "no such host"),
        ))));
        let err = client.forward_chat(&hello()).await.unwrap_err();

        assert_eq!(err.status_code(), 502);
        assert_eq!(err.code(), Some("ENOTFOUND"));
        assert_eq!(err.endpoint(), Some(endpoint(&server).as_str()));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::new(format!("http://127.0.0.1:{port}/responses"))
            .with_credentials(Credentials::default().with_api_key("k"));
        let err = FoundryClient::new(config)
            .unwrap()
            .forward_chat(&hello())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ConnectionRefused { .. }), "{err:?}");
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"output": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = Config::new(endpoint(&server))
            .with_timeout_seconds(1)
            .with_credentials(Credentials::default().with_api_key("k"));
        let err = FoundryClient::new(config)
            .unwrap()
            .forward_chat(&hello())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { .. }), "{err:?}");
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = api_key_client(&server)
            .forward_chat(&ForwardRequest::new(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_endpoint_override_and_invalid_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/custom"))
            .and(header_exists(API_KEY_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "custom"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = api_key_client(&server);
        let request = hello().with_endpoint(format!("{}/custom", server.uri()));
        assert_eq!(client.forward_chat(&request).await.unwrap().text, "custom");

        let err = client
            .forward_chat(&hello().with_endpoint("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = Config::new("https://example.com/responses")
            .with_credentials(Credentials::default().with_api_key("hidden-key-value"));
        let client = FoundryClient::new(config).unwrap();
        assert!(!format!("{client:?}").contains("hidden-key-value"));
    }
}
