//! OAuth2 client-credentials tokens for Entra ID.
//!
//! [`TokenManager`] fetches bearer tokens from the identity provider and keeps
//! the most recent one in a shared [`TokenCache`]. Tokens are treated as
//! expired 50 minutes after acquisition, ahead of the provider's usual hour.
//!
//! Concurrent cache misses are not coalesced; each caller may fetch its own
//! token and the last writer wins.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, info};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use foundry_common::client::{Config, Credentials};

use crate::error::error_chain;

/// Seconds a freshly issued token is reused for.
pub const TOKEN_LIFETIME_SECS: i64 = 50 * 60;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A bearer token and the instant it stops being reused.
#[derive(Clone)]
pub struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    /// Creates a cached token.
    #[must_use]
    pub const fn new(token: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    /// The token value.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// When the token stops being reused.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token may still be used at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Process-wide holder of the most recently issued token.
///
/// The lock is only held to copy the token in or out, never across an await.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, valid or not.
    #[must_use]
    pub fn get(&self) -> Option<CachedToken> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The cached token if it is still valid at `now`.
    #[must_use]
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<SecretString> {
        self.get()
            .filter(|cached| cached.is_valid_at(now))
            .map(|cached| cached.token)
    }

    /// Replaces the cached token.
    pub fn store(&self, token: CachedToken) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Drops the cached token.
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Reasons a token could not be obtained.
#[derive(Debug, Error)]
pub enum TokenError {
    /// One or more OAuth2 credentials are missing.
    #[error("Entra ID credentials not configured. Missing: {}", .0.join(", "))]
    NotConfigured(Vec<&'static str>),

    /// The identity provider answered with a non-success status.
    #[error("Token request failed with status {status}: {body}")]
    Rejected {
        /// HTTP status from the identity provider.
        status: u16,
        /// Response body, usually an OAuth2 error document.
        body: String,
    },

    /// The token request could not be sent or its body could not be read.
    #[error("Token request failed: {}", error_chain(.0))]
    Request(#[from] reqwest::Error),

    /// The identity provider's answer is not JSON.
    #[error("Token response is not valid JSON: {0}")]
    Malformed(String),

    /// The identity provider's answer has no `access_token`.
    #[error("Token response did not contain an access_token")]
    MissingAccessToken,
}

impl TokenError {
    /// Whether the failure happened before the identity provider answered.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Acquires bearer tokens with the client-credentials grant.
pub struct TokenManager {
    http: reqwest::Client,
    config: Arc<Config>,
    cache: Arc<TokenCache>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("authority_host", &self.config.authority_host)
            .field("scope", &self.config.scope)
            .field("cache", &self.cache)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager that reads and writes `cache`.
    #[must_use]
    pub fn new(http: reqwest::Client, config: Arc<Config>, cache: Arc<TokenCache>) -> Self {
        Self {
            http,
            config,
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The shared cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// The current time according to this manager's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn credentials(&self) -> &Credentials {
        &self.config.credentials
    }

    /// Returns a valid token, fetching a new one on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotConfigured`] without any network activity if
    /// an OAuth2 credential is missing, otherwise the reason the identity
    /// provider did not issue a token.
    pub async fn acquire(&self) -> Result<SecretString, TokenError> {
        let Some(credentials) = self.credentials().client_credentials() else {
            return Err(TokenError::NotConfigured(
                self.credentials().missing_oauth_fields(),
            ));
        };

        if let Some(token) = self.cache.valid_token(self.clock.now()) {
            debug!("Using cached access token");
            return Ok(token);
        }

        let url = self.config.token_url(credentials.tenant_id);
        debug!("Requesting access token from {url}");

        let form = [
            ("client_id", credentials.client_id),
            ("client_secret", credentials.client_secret.expose_secret()),
            ("scope", self.config.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self.http.post(&url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Token request failed: {} {}", status.as_u16(), body.trim());
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
            .ok_or(TokenError::MissingAccessToken)?;

        let expires_at = self.clock.now() + TimeDelta::seconds(TOKEN_LIFETIME_SECS);
        self.cache.store(CachedToken::new(token.clone(), expires_at));
        info!(
            "Obtained access token ({} characters), reusing until {expires_at}",
            token.expose_secret().len()
        );

        Ok(token)
    }

    /// Returns a valid token, or `None` if OAuth2 is not configured or the
    /// identity provider did not issue one.
    ///
    /// Failures are logged, not returned.
    pub async fn access_token(&self) -> Option<SecretString> {
        match self.acquire().await {
            Ok(token) => Some(token),
            Err(TokenError::NotConfigured(_)) => None,
            Err(e) => {
                error!("Error getting access token: {e}");
                None
            }
        }
    }
}
