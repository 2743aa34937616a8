//! Parsed upstream endpoint URLs.

use std::fmt;

use url::{Host, Url};

use crate::error::ClientError;

/// An endpoint URL with a resolvable host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
}

impl Endpoint {
    /// Parses an endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if the URL does not parse or
    /// has no host.
    pub fn parse(endpoint: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(invalid("URL has no host".to_string())),
        };

        Ok(Self { url, host })
    }

    /// Host name or IP literal, without brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `scheme://host[:port]`, with the port only when it is not the scheme default.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.url.host_str().unwrap_or(self.host.as_str());
        match self.url.port() {
            Some(port) => format!("{}://{host}:{port}", self.url.scheme()),
            None => format!("{}://{host}", self.url.scheme()),
        }
    }

    /// The full URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_parse_keeps_query() {
        let endpoint =
            Endpoint::parse("https://agent.example.com/api/responses?api-version=1").unwrap();
        assert_eq!(endpoint.host(), "agent.example.com");
        assert_eq!(endpoint.base_url(), "https://agent.example.com");
        assert_eq!(
            endpoint.to_string(),
            "https://agent.example.com/api/responses?api-version=1"
        );
    }

    #[test]
    fn test_base_url_keeps_non_default_port() {
        let endpoint = Endpoint::parse("http://127.0.0.1:8080/responses").unwrap();
        assert_eq!(endpoint.base_url(), "http://127.0.0.1:8080");
        assert_eq!(endpoint.host(), "127.0.0.1");

        let endpoint = Endpoint::parse("https://example.com:443/x").unwrap();
        assert_eq!(endpoint.base_url(), "https://example.com");
    }

    #[test]
    fn test_ipv6_host_has_no_brackets() {
        let endpoint = Endpoint::parse("http://[::1]:3000/").unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.base_url(), "http://[::1]:3000");
    }

    #[test]
    fn test_rejects_unparsable_and_hostless() {
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            Endpoint::parse("mailto:someone@example.com"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
    }
}
