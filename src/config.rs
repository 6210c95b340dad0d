//! Static upstream tables and tuning knobs.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Upstreams for all public traffic. May contain hostnames.
pub const PRIMARY_ENDPOINTS: &[&str] = &[
    "https://1.0.0.1/dns-query",
    "https://1.1.1.1/dns-query",
    "https://dns.google/dns-query",
    "https://doh.cleanbrowsing.org/doh/security-filter/",
];

/// Upstreams used only to bootstrap hostnames in [`PRIMARY_ENDPOINTS`].
///
/// Must be IP literals: these are reached without any name resolution.
pub const ROOT_ENDPOINTS: &[&str] = &["https://1.0.0.1/dns-query", "https://1.1.1.1/dns-query"];

/// HTTPS transport settings shared by the primary and root clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on establishing a connection, TLS handshake included.
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    /// Deadline for one bootstrap lookup through the root client.
    pub bootstrap_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            bootstrap_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local UDP address to bind (e.g., 0.0.0.0:53)
    pub listen: SocketAddr,
    /// Maximum number of queries being forwarded at once
    pub max_in_flight: usize,
    /// Per-query deadline for the upstream round trip
    pub query_timeout: Duration,
    /// Log every query (domain, peer, timing)
    pub verbose: bool,
    pub client: ClientConfig,
    pub primary_endpoints: Vec<String>,
    pub root_endpoints: Vec<String>,
}

impl ProxyConfig {
    /// Build a config with the built-in endpoint tables.
    pub fn new(
        listen: &str,
        max_in_flight: usize,
        query_timeout: Duration,
        verbose: bool,
    ) -> Result<Self> {
        let listen = parse_listen(listen)?;
        if max_in_flight == 0 {
            return Err(Error::Config("max in-flight queries must be at least 1".to_string()));
        }
        if query_timeout.is_zero() {
            return Err(Error::Config("query timeout must be greater than zero".to_string()));
        }

        Ok(Self {
            listen,
            max_in_flight,
            query_timeout,
            verbose,
            client: ClientConfig::default(),
            primary_endpoints: PRIMARY_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            root_endpoints: ROOT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Parse a listen address. A bare `:port` binds every IPv4 interface.
fn parse_listen(listen: &str) -> Result<SocketAddr> {
    let parsed = match listen.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}").parse(),
        None => listen.parse(),
    };
    parsed.map_err(|e| Error::Config(format!("invalid listen address {listen}: {e}")))
}
