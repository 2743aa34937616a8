//! Error types for the proxy and their JSON responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use thiserror::Error;

use foundry_client::error::{TOKEN_CHECKLIST, UNAUTHORIZED_TROUBLESHOOTING, error_chain};
use foundry_client::{ClientError, ConnectionTestError};
use foundry_common::InvalidPayload;

const SETUP_HELP: &str = "See GET /diagnose-auth for setup instructions";
const TROUBLESHOOTING_HELP: &str = "See GET /diagnose-auth for troubleshooting";
const UNAUTHORIZED_HELP: &str = "See GET /diagnose-auth for detailed troubleshooting steps";

/// Errors raised while loading configuration or starting the server.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error (binding the listener, serving).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("Configuration error: {0}")]
    Invalid(String),

    /// The upstream client could not be built.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type alias using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors answered to HTTP callers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The body is not a JSON object.
    #[error("Invalid JSON body: {0}")]
    Body(#[from] JsonRejection),

    /// The body is JSON but has no usable messages.
    #[error(transparent)]
    Payload(#[from] InvalidPayload),

    /// Forwarding failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The connectivity probe failed.
    #[error(transparent)]
    ConnectionTest(#[from] ConnectionTestError),
}

impl ProxyError {
    /// HTTP status answered for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Body(_) | Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::Client(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::ConnectionTest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body answered for this error.
    ///
    /// With `development` set, the error chain is added under `stack`.
    #[must_use]
    pub fn body(&self, development: bool) -> Value {
        let mut body = match self {
            Self::Body(rejection) => object(json!({
                "error": "Invalid JSON body",
                "details": rejection.body_text(),
            })),
            Self::Payload(err) => object(json!({ "error": err.to_string() })),
            Self::Client(err) => client_error_body(err),
            Self::ConnectionTest(err) => {
                let mut body = object(json!({
                    "status": "error",
                    "message": "Connection test failed",
                    "error": err.message,
                    "endpoint": err.endpoint,
                }));
                if let Some(code) = err.code {
                    body.insert("code".to_string(), json!(code));
                }
                body
            }
        };

        if development {
            body.insert("stack".to_string(), json!(error_chain(self)));
        }
        Value::Object(body)
    }

    /// Pairs the error with the response mode.
    #[must_use]
    pub const fn with_mode(self, development: bool) -> ErrorReply {
        ErrorReply {
            error: self,
            development,
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn client_error_body(err: &ClientError) -> Map<String, Value> {
    match err {
        ClientError::MissingCredentials { missing } => object(json!({
            "error": err.to_string(),
            "details": format!(
                "Please set the following environment variables: {}",
                missing.join(", ")
            ),
            "help": SETUP_HELP,
        })),
        ClientError::TokenUnavailable => object(json!({
            "error": err.to_string(),
            "details": TOKEN_CHECKLIST,
            "help": TROUBLESHOOTING_HELP,
        })),
        ClientError::UpstreamUnauthorized { message, details } => object(json!({
            "error": err.to_string(),
            "message": message,
            "details": details,
            "troubleshooting": UNAUTHORIZED_TROUBLESHOOTING,
            "help": UNAUTHORIZED_HELP,
        })),
        ClientError::Upstream {
            status,
            message,
            details,
        } => object(json!({
            "error": message,
            "details": details,
            "status": status,
        })),
        ClientError::InvalidEndpoint { endpoint, reason } => object(json!({
            "error": "Invalid endpoint URL",
            "details": reason,
            "endpoint": endpoint,
        })),
        ClientError::InvalidResponse(reason) => object(json!({
            "error": "Invalid response from upstream API",
            "details": reason,
        })),
        ClientError::DnsResolution { endpoint, .. } => transport_body(
            err,
            format!(
                "DNS resolution failed for endpoint. Please verify:\n\
                 1. The endpoint URL is correct (check Foundry Portal)\n\
                 2. The resource name is spelled correctly\n\
                 3. Your network can reach Azure services\n\n\
                 Endpoint: {endpoint}"
            ),
        ),
        ClientError::ConnectionRefused { .. } => transport_body(
            err,
            "Connection refused. The endpoint may be unreachable or the service may be down."
                .to_string(),
        ),
        ClientError::Timeout { .. } => transport_body(
            err,
            "Connection timeout. Please check your network connection.".to_string(),
        ),
        ClientError::Network { reason, .. } => transport_body(err, reason.clone()),
        _ => object(json!({ "error": err.to_string() })),
    }
}

fn transport_body(err: &ClientError, message: String) -> Map<String, Value> {
    let mut body = object(json!({
        "error": message,
        "details": err.to_string(),
    }));
    if let Some(code) = err.code() {
        body.insert("code".to_string(), json!(code));
    }
    if let Some(endpoint) = err.endpoint() {
        body.insert("endpoint".to_string(), json!(endpoint));
    }
    body
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.with_mode(false).into_response()
    }
}

/// A [`ProxyError`] rendered in production or development mode.
#[derive(Debug)]
pub struct ErrorReply {
    error: ProxyError,
    development: bool,
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        (self.error.status(), Json(self.error.body(self.development))).into_response()
    }
}
