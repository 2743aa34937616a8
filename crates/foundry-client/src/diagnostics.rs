//! Health, authentication and connectivity reports.
//!
//! These back the proxy's `/health`, `/diagnose-auth` and `/test-connection`
//! endpoints. Field names are camelCase because the chat widget and the
//! operator scripts read them directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::header::USER_AGENT;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use foundry_common::client::{AuthMode, CLIENT_SECRET_VAR, TENANT_ID_VAR};

use crate::dns::resolve_preferring_ipv4;
use crate::endpoint::Endpoint;
use crate::error::classify_transport_error;
use crate::responses::FoundryClient;
use crate::token::TokenError;

/// Characters of the tenant and client ids shown in reports.
const ID_PREFIX_CHARS: usize = 8;
/// Characters of a live token shown in reports.
const TOKEN_PREVIEW_CHARS: usize = 20;

/// Answer to `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Always `"ok"`.
    pub status: String,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Active authentication method.
    pub auth: AuthMode,
    /// Default upstream endpoint.
    pub endpoint: String,
}

/// Which credentials are configured, without revealing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfiguration {
    /// A static API key is set.
    pub has_api_key: bool,
    /// Length of the API key in characters.
    pub api_key_length: usize,
    /// The tenant id is set.
    pub has_tenant_id: bool,
    /// First characters of the tenant id followed by `...`.
    pub tenant_id: Option<String>,
    /// The client id is set.
    pub has_client_id: bool,
    /// First characters of the client id followed by `...`.
    pub client_id: Option<String>,
    /// The client secret is set.
    pub has_client_secret: bool,
    /// Length of the client secret in characters.
    pub client_secret_length: usize,
    /// A token is in the cache.
    pub has_cached_token: bool,
    /// Expiry of the cached token.
    pub token_expiry: Option<DateTime<Utc>>,
    /// The cached token is still valid.
    pub token_valid: bool,
}

/// Outcome of a live token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTestStatus {
    /// A token was issued.
    Success,
    /// The identity provider answered but issued no token.
    Failed,
    /// The identity provider could not be reached.
    Error,
}

/// Result of the live token probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTest {
    /// Outcome.
    pub status: TokenTestStatus,
    /// Human-readable summary.
    pub message: String,
    /// First characters of the token followed by `...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_preview: Option<String>,
    /// Token length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_length: Option<usize>,
    /// Cause of a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to `GET /diagnose-auth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDiagnostics {
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Configured credentials.
    pub configuration: AuthConfiguration,
    /// Problems found.
    pub issues: Vec<String>,
    /// Suggested fixes, in the order problems were found.
    pub recommendations: Vec<String>,
    /// Live token probe; present only when OAuth2 is fully configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_test: Option<TokenTest>,
}

/// Answer to a successful `GET /test-connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    /// Always `"success"`.
    pub status: String,
    /// Human-readable summary.
    pub message: String,
    /// Default upstream endpoint.
    pub endpoint: String,
    /// `scheme://host[:port]` that was probed.
    pub base_url: String,
    /// Host that was resolved.
    pub hostname: String,
    /// Addresses of the preferred family.
    #[serde(rename = "resolvedIPs")]
    pub resolved_ips: Vec<String>,
    /// Status of the `HEAD` probe.
    pub http_status: u16,
    /// Response headers of the `HEAD` probe.
    pub headers: BTreeMap<String, String>,
}

/// A failed connectivity test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectionTestError {
    /// What failed.
    pub message: String,
    /// Short machine-readable code, when the failure has one.
    pub code: Option<&'static str>,
    /// Default upstream endpoint.
    pub endpoint: String,
}

fn prefix(value: &str, chars: usize) -> String {
    let head: String = value.chars().take(chars).collect();
    format!("{head}...")
}

impl FoundryClient {
    /// Reports liveness and the active authentication method.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            auth: self.config.credentials.auth_mode(),
            endpoint: self.config.endpoint.clone(),
        }
    }

    /// Describes the credential configuration and, when OAuth2 is fully
    /// configured, requests a token to prove it works.
    pub async fn diagnose_auth(&self) -> AuthDiagnostics {
        let credentials = &self.config.credentials;
        let now = self.tokens.now();
        let cached = self.tokens.cache().get();

        let configuration = AuthConfiguration {
            has_api_key: credentials.api_key.is_some(),
            api_key_length: credentials
                .api_key
                .as_ref()
                .map_or(0, |key| key.expose_secret().chars().count()),
            has_tenant_id: credentials.tenant_id.is_some(),
            tenant_id: credentials
                .tenant_id
                .as_deref()
                .map(|id| prefix(id, ID_PREFIX_CHARS)),
            has_client_id: credentials.client_id.is_some(),
            client_id: credentials
                .client_id
                .as_deref()
                .map(|id| prefix(id, ID_PREFIX_CHARS)),
            has_client_secret: credentials.client_secret.is_some(),
            client_secret_length: credentials
                .client_secret
                .as_ref()
                .map_or(0, |secret| secret.expose_secret().chars().count()),
            has_cached_token: cached.is_some(),
            token_expiry: cached.as_ref().map(|token| token.expires_at()),
            token_valid: cached.as_ref().is_some_and(|token| token.is_valid_at(now)),
        };

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if !configuration.has_api_key && !configuration.has_client_id {
            issues.push("No authentication method configured".to_string());
            recommendations.push(
                "Set either FOUNDRY_API_KEY or Entra ID credentials \
                 (AZURE_TENANT_ID, AZURE_CLIENT_ID, AZURE_CLIENT_SECRET)"
                    .to_string(),
            );
        }

        if configuration.has_client_id
            && (!configuration.has_tenant_id || !configuration.has_client_secret)
        {
            issues.push("Incomplete Entra ID configuration".to_string());
            if !configuration.has_tenant_id {
                recommendations.push(format!("Set {TENANT_ID_VAR} environment variable"));
            }
            if !configuration.has_client_secret {
                recommendations.push(format!(
                    "Set {CLIENT_SECRET_VAR} environment variable (use the VALUE, not Secret ID)"
                ));
            }
        }

        let token_test = if credentials.client_credentials().is_some() {
            Some(self.probe_token(&mut issues, &mut recommendations).await)
        } else {
            None
        };

        AuthDiagnostics {
            timestamp: Utc::now(),
            configuration,
            issues,
            recommendations,
            token_test,
        }
    }

    async fn probe_token(
        &self,
        issues: &mut Vec<String>,
        recommendations: &mut Vec<String>,
    ) -> TokenTest {
        match self.tokens.acquire().await {
            Ok(token) => {
                let token = token.expose_secret();
                TokenTest {
                    status: TokenTestStatus::Success,
                    message: "Successfully obtained access token".to_string(),
                    token_preview: Some(prefix(token, TOKEN_PREVIEW_CHARS)),
                    token_length: Some(token.chars().count()),
                    error: None,
                }
            }
            Err(e @ TokenError::Request(_)) => {
                warn!("Token probe could not reach the identity provider: {e}");
                issues.push(format!("Token acquisition error: {e}"));
                TokenTest {
                    status: TokenTestStatus::Error,
                    message: e.to_string(),
                    token_preview: None,
                    token_length: None,
                    error: Some(format!("{e:?}")),
                }
            }
            Err(e) => {
                warn!("Token probe failed: {e}");
                issues.push("Token acquisition failed".to_string());
                recommendations.extend(
                    [
                        "Check Tenant ID, Client ID, and Client Secret are correct",
                        "Verify Client Secret is the VALUE (not Secret ID)",
                        "Check that Client Secret has not expired",
                        "If the app role was assigned recently, wait 5-10 minutes for propagation",
                    ]
                    .map(String::from),
                );
                TokenTest {
                    status: TokenTestStatus::Failed,
                    message: "Failed to obtain access token".to_string(),
                    token_preview: None,
                    token_length: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Resolves the default endpoint's host and sends an unauthenticated
    /// `HEAD` to its base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionTestError`] if the endpoint is invalid, the host
    /// does not resolve or the probe fails at the transport level. Any HTTP
    /// status counts as a successful probe.
    pub async fn test_connection(&self) -> Result<ConnectionReport, ConnectionTestError> {
        let endpoint_str = self.config.endpoint.clone();
        let fail = |message: String, code: Option<&'static str>| ConnectionTestError {
            message,
            code,
            endpoint: endpoint_str.clone(),
        };

        let endpoint = Endpoint::parse(&endpoint_str).map_err(|e| fail(e.to_string(), None))?;
        let base_url = endpoint.base_url();
        info!("Testing connection to: {base_url}");

        let addrs = resolve_preferring_ipv4(self.resolver.as_ref(), endpoint.host())
            .await
            .map_err(|e| fail(format!("DNS resolution failed: {}", e.reason), Some("ENOTFOUND")))?;

        let response = self
            .http
            .head(&base_url)
            .header(
                USER_AGENT,
                concat!("foundry-proxy/", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .map_err(|e| {
                let err = classify_transport_error(&e, &endpoint_str, endpoint.host());
                fail(err.to_string(), err.code())
            })?;

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(ConnectionReport {
            status: "success".to_string(),
            message: "Connection test successful".to_string(),
            endpoint: endpoint_str.clone(),
            base_url,
            hostname: endpoint.host().to_string(),
            resolved_ips: addrs.iter().map(ToString::to_string).collect(),
            http_status: response.status().as_u16(),
            headers,
        })
    }
}
