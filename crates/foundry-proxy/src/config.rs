//! Proxy configuration.
//!
//! Settings come from an optional TOML file named by `FOUNDRY_PROXY_CONFIG`,
//! then environment variables override individual fields. Credentials are
//! read from the environment only and are never accepted from the file.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 8080
//!
//! [upstream]
//! endpoint = "https://my-resource.services.ai.azure.com/api/projects/demo/openai/responses?api-version=2025-05-01"
//! authority_host = "https://login.microsoftonline.com"
//! scope = "https://ai.azure.com/.default"
//! timeout_seconds = 60
//! ```

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use foundry_client::Endpoint;
use foundry_common::client::{
    API_KEY_VAR, CLIENT_ID_VAR, CLIENT_SECRET_VAR, DEFAULT_AUTHORITY_HOST, DEFAULT_ENDPOINT,
    DEFAULT_SCOPE, TENANT_ID_VAR,
};
use foundry_common::{Config, Credentials};

use crate::error::{ConfigError, Result};

/// Environment variable naming the optional TOML file.
pub const CONFIG_PATH_VAR: &str = "FOUNDRY_PROXY_CONFIG";

/// Proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Upstream agent and identity provider settings.
    #[serde(default)]
    pub upstream: UpstreamSettings,

    /// Upstream credentials, from the environment.
    #[serde(skip)]
    pub credentials: Credentials,

    /// Development mode adds the error chain to error responses.
    #[serde(skip)]
    pub development: bool,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to bind (default: 0.0.0.0)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on (default: 3001)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Upstream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSettings {
    /// Agent endpoint used when a request does not name one.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Identity provider host.
    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    /// OAuth2 scope requested for the agent service.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Request timeout in seconds (default: none)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            authority_host: default_authority_host(),
            scope: default_scope(),
            timeout_seconds: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3001
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl ProxyConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, an
    /// override cannot be parsed, or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Loads configuration using `lookup` to read environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyConfig::load`].
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut config = match var(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(port) = var("PORT") {
            config.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid PORT '{port}': {e}")))?;
        }
        if let Some(bind) = var("FOUNDRY_BIND") {
            config.server.bind = bind;
        }
        if let Some(endpoint) = var("FOUNDRY_ENDPOINT") {
            config.upstream.endpoint = endpoint;
        }
        if let Some(authority_host) = var("AZURE_AUTHORITY_HOST") {
            config.upstream.authority_host = authority_host;
        }
        if let Some(scope) = var("FOUNDRY_SCOPE") {
            config.upstream.scope = scope;
        }
        if let Some(timeout) = var("FOUNDRY_TIMEOUT_SECS") {
            config.upstream.timeout_seconds = Some(timeout.trim().parse().map_err(|e| {
                ConfigError::Invalid(format!("Invalid FOUNDRY_TIMEOUT_SECS '{timeout}': {e}"))
            })?);
        }

        config.credentials = Credentials {
            api_key: var(API_KEY_VAR).map(Into::into),
            tenant_id: var(TENANT_ID_VAR),
            client_id: var(CLIENT_ID_VAR),
            client_secret: var(CLIENT_SECRET_VAR).map(Into::into),
        };
        config.development = lookup("NODE_ENV").as_deref() == Some("development");

        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file without applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0, the bind address is not an IP
    /// address, the default endpoint is not a URL with a host, or the timeout
    /// is 0.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("Port must be non-zero".to_string()));
        }

        self.socket_addr()?;

        Endpoint::parse(&self.upstream.endpoint)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.upstream.timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.server.bind.parse().map_err(|e| {
            ConfigError::Invalid(format!("Invalid bind address '{}': {e}", self.server.bind))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Client configuration for the upstream agent.
    #[must_use]
    pub fn client_config(&self) -> Config {
        let config = Config::new(self.upstream.endpoint.clone())
            .with_authority_host(self.upstream.authority_host.clone())
            .with_scope(self.upstream.scope.clone())
            .with_credentials(self.credentials.clone());
        match self.upstream.timeout_seconds {
            Some(seconds) => config.with_timeout_seconds(seconds),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::HashMap;
    use std::io::Write;

    use foundry_common::AuthMode;
    use secrecy::ExposeSecret;
    use tempfile::NamedTempFile;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::load_with(env(&[])).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.upstream.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.upstream.timeout_seconds, None);
        assert!(!config.development);
        assert_eq!(config.credentials.auth_mode(), AuthMode::None);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3001");
    }

    #[test]
    fn test_environment_overrides() {
        let config = ProxyConfig::load_with(env(&[
            ("PORT", "8080"),
            ("FOUNDRY_BIND", "127.0.0.1"),
            ("FOUNDRY_ENDPOINT", "https://agent.example.com/responses"),
            ("FOUNDRY_TIMEOUT_SECS", "30"),
            ("NODE_ENV", "development"),
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert!(config.development);

        let client = config.client_config();
        assert_eq!(client.endpoint, "https://agent.example.com/responses");
        assert_eq!(client.timeout_seconds, Some(30));
        assert_eq!(client.credentials.auth_mode(), AuthMode::EntraId);
        assert_eq!(
            client.credentials.client_secret.unwrap().expose_secret(),
            "secret"
        );
    }

    #[test]
    fn test_blank_variables_are_unset() {
        let config =
            ProxyConfig::load_with(env(&[("FOUNDRY_API_KEY", "  "), ("PORT", "")])).unwrap();
        assert!(config.credentials.api_key.is_none());
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_only_exact_development_value_enables_development() {
        let config = ProxyConfig::load_with(env(&[("NODE_ENV", "production")])).unwrap();
        assert!(!config.development);
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[upstream]
endpoint = "https://from-file.example.com/responses"
timeout_seconds = 45
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = ProxyConfig::load_with(env(&[
            ("FOUNDRY_PROXY_CONFIG", path.as_str()),
            ("PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(
            config.upstream.endpoint,
            "https://from-file.example.com/responses"
        );
        assert_eq!(config.upstream.timeout_seconds, Some(45));
        assert_eq!(config.upstream.scope, DEFAULT_SCOPE);
    }

    #[test]
    fn test_secrets_are_rejected_in_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[upstream]\napi_key = \"nope\"").unwrap();

        let err = ProxyConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ProxyConfig::load_with(env(&[(
            "FOUNDRY_PROXY_CONFIG",
            "/nonexistent/foundry-proxy.toml",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validation() {
        assert!(ProxyConfig::load_with(env(&[("PORT", "0")])).is_err());
        assert!(ProxyConfig::load_with(env(&[("PORT", "http")])).is_err());
        assert!(ProxyConfig::load_with(env(&[("FOUNDRY_BIND", "localhost")])).is_err());
        assert!(ProxyConfig::load_with(env(&[("FOUNDRY_ENDPOINT", "not a url")])).is_err());
        assert!(ProxyConfig::load_with(env(&[("FOUNDRY_TIMEOUT_SECS", "0")])).is_err());
    }
}
