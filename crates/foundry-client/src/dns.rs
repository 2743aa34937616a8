//! Host resolution with IPv4 preference.
//!
//! Some networks advertise IPv6 routes to Azure that do not actually work, so
//! both the preflight check and the HTTP connector try IPv4 first.

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

/// Failure to resolve a host to any usable address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("DNS resolution failed for {host}: {reason}")]
pub struct DnsError {
    /// Host that was looked up.
    pub host: String,
    /// Resolver error text.
    pub reason: String,
}

impl DnsError {
    /// Creates an error for `host`.
    pub fn new(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

/// Looks up the addresses of a host.
#[async_trait]
pub trait Resolver: Send + Sync + Debug {
    /// Returns every address the host resolves to, in resolver order.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError`] if the lookup fails.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| DnsError::new(host, e.to_string()))?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolves `host`, keeping only IPv4 addresses when there are any and
/// falling back to IPv6 otherwise.
///
/// # Errors
///
/// Returns [`DnsError`] if the lookup fails or yields no address.
pub async fn resolve_preferring_ipv4(
    resolver: &dyn Resolver,
    host: &str,
) -> Result<Vec<IpAddr>, DnsError> {
    debug!("Resolving DNS for: {host}");
    let addrs = resolver.lookup(host).await?;

    let ipv4: Vec<IpAddr> = addrs.iter().copied().filter(IpAddr::is_ipv4).collect();
    if !ipv4.is_empty() {
        debug!("DNS resolved (IPv4) to: {}", join_ips(&ipv4));
        return Ok(ipv4);
    }

    let ipv6: Vec<IpAddr> = addrs.into_iter().filter(IpAddr::is_ipv6).collect();
    if !ipv6.is_empty() {
        debug!("DNS resolved (IPv6) to: {}", join_ips(&ipv6));
        return Ok(ipv6);
    }

    Err(DnsError::new(host, "no addresses found"))
}

/// Orders addresses with every IPv4 address ahead of every IPv6 address,
/// keeping resolver order within each family.
#[must_use]
pub fn ipv4_first(mut addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    addrs.sort_by_key(IpAddr::is_ipv6);
    addrs
}

fn join_ips(addrs: &[IpAddr]) -> String {
    addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Connection-time resolver for `reqwest` that dials IPv4 addresses first.
impl reqwest::dns::Resolve for SystemResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let resolver = *self;
        Box::pin(async move {
            let addrs = resolver
                .lookup(name.as_str())
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            if addrs.is_empty() {
                return Err(Box::new(DnsError::new(name.as_str(), "no addresses found"))
                    as Box<dyn std::error::Error + Send + Sync>);
            }
            let ordered: reqwest::dns::Addrs = Box::new(
                ipv4_first(addrs)
                    .into_iter()
                    .map(|ip| SocketAddr::new(ip, 0)),
            );
            Ok(ordered)
        })
    }
}
