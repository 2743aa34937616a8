//! Client configuration and the request/response types of the chat proxy.
//!
//! [`Config`] carries everything the forwarding client needs: the default
//! upstream endpoint, the identity provider coordinates and the
//! [`Credentials`]. Secrets are wrapped in [`SecretString`] and never
//! serialized.
//!
//! [`ChatPayload`] is the body accepted on `POST /api/chat`; it is validated into
//! a [`ForwardRequest`]. The proxy answers with a [`ForwardResponse`].

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chat::ChatMessage;

/// Upstream endpoint used when neither the caller nor the configuration names one.
pub const DEFAULT_ENDPOINT: &str = "https://your-resource.services.ai.azure.com/api/projects/your-project/applications/your-agent/protocols/openai/responses?api-version=2025-11-15-preview";

/// Microsoft identity platform host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default OAuth2 scope of the hosted agent service.
pub const DEFAULT_SCOPE: &str = "https://ai.azure.com/.default";

/// Environment variable holding the tenant id.
pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
/// Environment variable holding the client id.
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
/// Environment variable holding the client secret.
pub const CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";
/// Environment variable holding the static subscription key.
pub const API_KEY_VAR: &str = "FOUNDRY_API_KEY";

/// Which authentication method the proxy will use for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Static subscription key.
    #[serde(rename = "API Key")]
    ApiKey,
    /// OAuth2 client-credentials against Microsoft Entra ID.
    #[serde(rename = "Entra ID")]
    EntraId,
    /// Nothing usable is configured.
    #[serde(rename = "None")]
    None,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ApiKey => "API Key",
            Self::EntraId => "Entra ID",
            Self::None => "None",
        })
    }
}

/// Upstream credentials.
///
/// At most one method is active: a configured API key always wins over the
/// OAuth2 client credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Static subscription key.
    pub api_key: Option<SecretString>,
    /// Directory (tenant) id.
    pub tenant_id: Option<String>,
    /// Application (client) id.
    pub client_id: Option<String>,
    /// Client secret value (not the secret id).
    pub client_secret: Option<SecretString>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Borrowed view of a complete set of OAuth2 client credentials.
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    /// Directory (tenant) id.
    pub tenant_id: &'a str,
    /// Application (client) id.
    pub client_id: &'a str,
    /// Client secret value.
    pub client_secret: &'a SecretString,
}

impl Credentials {
    /// Sets the static API key. Blank keys are ignored.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_blank(api_key.into()).map(SecretString::from);
        self
    }

    /// Sets the OAuth2 client credentials. Blank values are ignored.
    #[must_use]
    pub fn with_client_credentials(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.tenant_id = non_blank(tenant_id.into());
        self.client_id = non_blank(client_id.into());
        self.client_secret = non_blank(client_secret.into()).map(SecretString::from);
        self
    }

    /// The API key, if one is configured and non-empty.
    #[must_use]
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
    }

    /// Complete client credentials, or `None` if any field is missing.
    #[must_use]
    pub fn client_credentials(&self) -> Option<ClientCredentials<'_>> {
        Some(ClientCredentials {
            tenant_id: self.tenant_id.as_deref().filter(|s| !s.is_empty())?,
            client_id: self.client_id.as_deref().filter(|s| !s.is_empty())?,
            client_secret: self
                .client_secret
                .as_ref()
                .filter(|s| !s.expose_secret().is_empty())?,
        })
    }

    /// Environment variable names of the OAuth2 fields that are missing.
    #[must_use]
    pub fn missing_oauth_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.tenant_id.as_deref().is_none_or(str::is_empty) {
            missing.push(TENANT_ID_VAR);
        }
        if self.client_id.as_deref().is_none_or(str::is_empty) {
            missing.push(CLIENT_ID_VAR);
        }
        if self
            .client_secret
            .as_ref()
            .is_none_or(|s| s.expose_secret().is_empty())
        {
            missing.push(CLIENT_SECRET_VAR);
        }
        missing
    }

    /// The active authentication mode.
    #[must_use]
    pub fn auth_mode(&self) -> AuthMode {
        if self.api_key().is_some() {
            AuthMode::ApiKey
        } else if self.client_credentials().is_some() {
            AuthMode::EntraId
        } else {
            AuthMode::None
        }
    }
}

/// Configuration for the forwarding client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream endpoint used when a request does not name one.
    pub endpoint: String,
    /// Identity provider host, e.g. `https://login.microsoftonline.com`.
    pub authority_host: String,
    /// OAuth2 scope requested for the upstream service.
    pub scope: String,
    /// Optional request timeout in seconds. `None` keeps the transport defaults.
    pub timeout_seconds: Option<u64>,
    /// Upstream credentials.
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout_seconds: None,
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    /// Creates a configuration targeting `endpoint` with default identity settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the identity provider host.
    #[must_use]
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the OAuth2 scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// The token endpoint for the configured tenant.
    #[must_use]
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{tenant_id}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/')
        )
    }
}

/// Body accepted on `POST /api/chat`.
///
/// Kept deliberately loose so validation can produce the proxy's own error
/// messages instead of a deserializer's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Conversation so far; must be a non-empty array.
    #[serde(default)]
    pub messages: Option<Value>,
    /// Optional upstream endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ChatPayload {
    /// Builds a payload from typed messages.
    #[must_use]
    pub fn from_messages(messages: &[ChatMessage], endpoint: Option<String>) -> Self {
        Self {
            messages: serde_json::to_value(messages).ok(),
            endpoint,
        }
    }
}

/// Reasons a [`ChatPayload`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPayload {
    /// `messages` is absent or not an array.
    #[error("Messages array is required")]
    MissingMessages,
    /// `messages` is an empty array.
    #[error("Messages array must contain at least one message")]
    EmptyMessages,
}

/// A validated chat request ready to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    /// Endpoint override; `None` uses the configured default.
    pub endpoint: Option<String>,
    /// Conversation in turn order, never empty.
    pub messages: Vec<ChatMessage>,
}

impl ForwardRequest {
    /// Creates a request from typed messages.
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            endpoint: None,
            messages,
        }
    }

    /// Overrides the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = non_blank(endpoint.into());
        self
    }

    /// Resolves the target endpoint against a default.
    #[must_use]
    pub fn endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint.as_deref().unwrap_or(default)
    }
}

impl TryFrom<ChatPayload> for ForwardRequest {
    type Error = InvalidPayload;

    fn try_from(payload: ChatPayload) -> Result<Self, Self::Error> {
        let Some(Value::Array(entries)) = payload.messages else {
            return Err(InvalidPayload::MissingMessages);
        };
        if entries.is_empty() {
            return Err(InvalidPayload::EmptyMessages);
        }

        Ok(Self {
            endpoint: payload.endpoint.and_then(non_blank),
            messages: entries.iter().map(ChatMessage::from_value).collect(),
        })
    }
}

/// Which upstream response shape produced the normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `output` was a plain string.
    OutputString,
    /// `output` was an array of output items.
    OutputItems,
    /// `output` was an object with `content` or `text`.
    OutputObject,
    /// OpenAI-compatible `choices[0].message.content`.
    ChatCompletion,
    /// Top-level `content`.
    Content,
    /// Top-level `text`.
    Text,
    /// Nothing recognizable; the raw payload was serialized.
    #[default]
    Raw,
}

/// Normalized reply returned to the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardResponse {
    /// Display text, never empty.
    pub text: String,
    /// Upstream payload, passed through for diagnostics.
    pub raw: Value,
    /// Shape the text was extracted from.
    #[serde(skip)]
    pub shape: ResponseShape,
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
