//! Error types for the client library.

use std::error::Error as StdError;
use std::io;

use serde_json::Value;
use thiserror::Error;

use foundry_common::chat::coerce_content;
use foundry_common::json::truthy_field;

/// Checklist returned when OAuth2 credentials are present but no token could
/// be obtained.
pub const TOKEN_CHECKLIST: [&str; 5] = [
    "1. Tenant ID is correct",
    "2. Client ID is correct",
    "3. Client Secret is the VALUE (not Secret ID)",
    "4. Client Secret has not expired",
    "5. App registration has proper permissions",
];

/// Troubleshooting steps returned when the upstream API answers 401.
pub const UNAUTHORIZED_TROUBLESHOOTING: [&str; 6] = [
    "1. Verify Tenant ID, Client ID, and Client Secret are correct",
    "2. Check that Client Secret is the VALUE (not Secret ID)",
    "3. Verify Client Secret has not expired",
    "4. Check role assignment: App needs \"Azure AI Developer\" or \"Contributor\" role",
    "5. Wait 5-10 minutes after role assignment for propagation",
    "6. Try assigning role at Subscription level if Resource level fails",
];

/// Errors that can occur while forwarding a chat request.
///
/// Every variant maps to a fixed HTTP status through [`ClientError::status_code`],
/// so the proxy can answer without inspecting error text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The request body is malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// The target endpoint is not a usable URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Endpoint as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Neither an API key nor a complete set of OAuth2 credentials is configured.
    #[error("Entra ID credentials not configured. Missing: {}", .missing.join(", "))]
    MissingCredentials {
        /// Environment variables that are unset or empty.
        missing: Vec<&'static str>,
    },

    /// OAuth2 credentials are configured but the identity provider did not
    /// issue a token.
    #[error("Failed to obtain access token. Please check:")]
    TokenUnavailable,

    /// The upstream API rejected the credentials.
    #[error("HTTP 401: Unauthorized")]
    UpstreamUnauthorized {
        /// Message extracted from the upstream error body.
        message: String,
        /// Upstream error body.
        details: Value,
    },

    /// The upstream API answered with a non-success status other than 401.
    #[error("{message}")]
    Upstream {
        /// Upstream HTTP status.
        status: u16,
        /// Message extracted from the upstream error body.
        message: String,
        /// Upstream error body.
        details: Value,
    },

    /// The endpoint host did not resolve.
    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolution {
        /// Host that failed to resolve.
        host: String,
        /// Endpoint the request was for.
        endpoint: String,
        /// Resolver error text.
        reason: String,
    },

    /// The upstream host refused the connection.
    #[error("Connection refused: {reason}")]
    ConnectionRefused {
        /// Endpoint the request was for.
        endpoint: String,
        /// Transport error text.
        reason: String,
    },

    /// The request timed out.
    #[error("Connection timeout: {reason}")]
    Timeout {
        /// Endpoint the request was for.
        endpoint: String,
        /// Transport error text.
        reason: String,
    },

    /// Any other transport failure.
    #[error("{reason}")]
    Network {
        /// Endpoint the request was for.
        endpoint: String,
        /// Transport error text.
        reason: String,
        /// Code of the underlying failure, such as `ECONNRESET`.
        code: &'static str,
    },

    /// The upstream API answered 2xx with a body that is not JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// HTTP status the proxy answers with for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidEndpoint { .. } => 400,
            Self::MissingCredentials { .. }
            | Self::TokenUnavailable
            | Self::UpstreamUnauthorized { .. } => 401,
            Self::Upstream { status, .. } => *status,
            Self::DnsResolution { .. } | Self::ConnectionRefused { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::Network { .. } | Self::InvalidResponse(_) | Self::Configuration(_) => 500,
        }
    }

    /// Short machine-readable code for transport failures.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::DnsResolution { .. } => Some("ENOTFOUND"),
            Self::ConnectionRefused { .. } => Some("ECONNREFUSED"),
            Self::Timeout { .. } => Some("ETIMEDOUT"),
            Self::Network { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Endpoint a transport failure refers to.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::InvalidEndpoint { endpoint, .. }
            | Self::DnsResolution { endpoint, .. }
            | Self::ConnectionRefused { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::Network { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Check if this is an authentication error.
    #[must_use]
    pub const fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials { .. }
                | Self::TokenUnavailable
                | Self::UpstreamUnauthorized { .. }
        )
    }

    /// Check if this error came from the transport rather than the upstream API.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::DnsResolution { .. }
                | Self::ConnectionRefused { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }
}

/// Parses an upstream error body, wrapping non-JSON text as `{"error": text}`.
#[must_use]
pub fn parse_error_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "error": text }))
}

/// Picks the most specific message from an upstream error body.
///
/// Tries `error.message`, then `message`, then falls back to `default`.
#[must_use]
pub fn upstream_message(details: &Value, default: &str) -> String {
    details
        .get("error")
        .and_then(|error| truthy_field(error, "message"))
        .or_else(|| truthy_field(details, "message"))
        .map_or_else(|| default.to_string(), coerce_content)
}

/// Renders an error and all of its sources, outermost first.
#[must_use]
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

/// Classifies a `reqwest` transport failure.
pub(crate) fn classify_transport_error(
    err: &reqwest::Error,
    endpoint: &str,
    host: &str,
) -> ClientError {
    let endpoint = endpoint.to_string();
    let reason = error_chain(err);

    if err.is_timeout() {
        return ClientError::Timeout { endpoint, reason };
    }

    let mut io_kind = None;
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if cause.is::<crate::dns::DnsError>() {
            return ClientError::DnsResolution {
                host: host.to_string(),
                endpoint,
                reason,
            };
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => {
                    return ClientError::ConnectionRefused { endpoint, reason };
                }
                io::ErrorKind::TimedOut => return ClientError::Timeout { endpoint, reason },
                kind => io_kind = io_kind.or(Some(kind)),
            }
        }
        source = cause.source();
    }

    if err.is_connect() && reason.contains("dns error") {
        return ClientError::DnsResolution {
            host: host.to_string(),
            endpoint,
            reason,
        };
    }

    let code = io_kind.map_or_else(|| request_code(err), io_code);
    ClientError::Network {
        endpoint,
        reason,
        code,
    }
}

/// Errno-style code for an I/O failure.
const fn io_code(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::AddrInUse => "EADDRINUSE",
        io::ErrorKind::NotConnected => "ENOTCONN",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::HostUnreachable => "EHOSTUNREACH",
        io::ErrorKind::NetworkUnreachable => "ENETUNREACH",
        io::ErrorKind::NetworkDown => "ENETDOWN",
        _ => "EIO",
    }
}

/// Code for a failure that carries no I/O error, from reqwest's classification.
fn request_code(err: &reqwest::Error) -> &'static str {
    if err.is_builder() {
        "ERR_INVALID_REQUEST"
    } else if err.is_connect() {
        "ERR_CONNECT"
    } else if err.is_redirect() {
        "ERR_TOO_MANY_REDIRECTS"
    } else if err.is_body() || err.is_decode() {
        "ERR_BODY"
    } else {
        "ERR_REQUEST"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_upstream_message_precedence() {
        let nested = json!({"error": {"message": "bad token"}, "message": "outer"});
        assert_eq!(upstream_message(&nested, "default"), "bad token");

        let flat = json!({"error": "plain", "message": "outer"});
        assert_eq!(upstream_message(&flat, "default"), "outer");

        let empty = json!({"error": {"message": ""}});
        assert_eq!(upstream_message(&empty, "default"), "default");
    }

    #[test]
    fn test_parse_error_body_wraps_text() {
        assert_eq!(parse_error_body("Bad Gateway"), json!({"error": "Bad Gateway"}));
        assert_eq!(parse_error_body(r#"{"code": 1}"#), json!({"code": 1}));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ClientError::InvalidRequest(String::new()).status_code(), 400);
        assert_eq!(ClientError::TokenUnavailable.status_code(), 401);
        assert_eq!(
            ClientError::Upstream {
                status: 429,
                message: String::new(),
                details: Value::Null,
            }
            .status_code(),
            429
        );
        assert_eq!(
            ClientError::DnsResolution {
                host: "h".into(),
                endpoint: "e".into(),
                reason: "r".into(),
            }
            .status_code(),
            502
        );
        assert_eq!(
            ClientError::Timeout {
                endpoint: "e".into(),
                reason: "r".into(),
            }
            .status_code(),
            504
        );
    }

    #[test]
    fn test_missing_credentials_message() {
        let err = ClientError::MissingCredentials {
            missing: vec!["AZURE_TENANT_ID", "AZURE_CLIENT_SECRET"],
        };
        assert_eq!(
            err.to_string(),
            "Entra ID credentials not configured. Missing: AZURE_TENANT_ID, AZURE_CLIENT_SECRET"
        );
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_network_error_carries_code() {
        let err = ClientError::Network {
            endpoint: "https://agent.example.com".into(),
            reason: "connection reset by peer".into(),
            code: io_code(io::ErrorKind::ConnectionReset),
        };
        assert_eq!(err.code(), Some("ECONNRESET"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(io_code(io::ErrorKind::BrokenPipe), "EPIPE");
        assert_eq!(io_code(io::ErrorKind::InvalidData), "EIO");
    }

    #[tokio::test]
    async fn test_unclassified_transport_error_keeps_code() {
        let err = reqwest::Client::new()
            .get("http://[::1")
            .send()
            .await
            .unwrap_err();

        let classified = classify_transport_error(&err, "http://[::1", "::1");
        assert!(matches!(classified, ClientError::Network { .. }));
        assert_eq!(classified.code(), Some("ERR_INVALID_REQUEST"));
        assert_eq!(classified.endpoint(), Some("http://[::1"));
    }

    #[test]
    fn test_error_chain_skips_repeated_text() {
        let inner = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let outer = io::Error::other(inner);
        assert_eq!(error_chain(&outer), "refused");
    }
}
