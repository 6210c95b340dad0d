//! Connect-time resolution of upstream hostnames.
//!
//! Some upstreams are only published under a hostname. Resolving those through
//! the system resolver would loop back into whatever we are replacing, so the
//! primary client's transport resolves them over DNS-JSON against a second,
//! IP-literal-only [`RootClient`] instead.
//!
//! The root client's own transport refuses every name lookup, and only
//! [`RootClient`] implements [`Lookup`], so resolution is at most one level deep.

use std::error::Error as StdError;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{debug, warn};

use crate::client::{DohClient, http_builder};
use crate::config::ClientConfig;
use crate::endpoint::EndpointSet;
use crate::error::{Error, Result};

/// Source of DNS-JSON answers for bootstrap lookups.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(
        &self,
        name: &str,
        record_type: &str,
        timeout: Duration,
    ) -> Result<Vec<String>>;
}

/// DoH client restricted to IP-literal endpoints.
#[derive(Debug, Clone)]
pub struct RootClient {
    client: DohClient,
}

impl RootClient {
    /// Build the root client. Fails if any endpoint host is a name.
    pub fn new(endpoints: EndpointSet, config: &ClientConfig) -> Result<Self> {
        if let Some(endpoint) = endpoints.hostnames().next() {
            return Err(Error::Config(format!(
                "root endpoint {endpoint} must use an IP literal host"
            )));
        }

        let http = http_builder(config)
            .https_only(true)
            .dns_resolver(Arc::new(NoNameResolution))
            .build()?;

        Ok(Self {
            client: DohClient::new(http, endpoints),
        })
    }

    /// Wrap a prebuilt client, e.g. one pointed at a local stub.
    #[cfg(test)]
    pub(crate) fn from_client(client: DohClient) -> Self {
        assert_eq!(client.endpoints().hostnames().count(), 0);
        Self { client }
    }
}

#[async_trait]
impl Lookup for RootClient {
    async fn lookup(
        &self,
        name: &str,
        record_type: &str,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        self.client.query(name, record_type, timeout).await
    }
}

/// Resolver hook for the root client's transport: there is nothing to resolve.
struct NoNameResolution;

impl Resolve for NoNameResolution {
    fn resolve(&self, name: Name) -> Resolving {
        warn!(host = name.as_str(), "Refusing name resolution for root client");
        let err: Box<dyn StdError + Send + Sync> = Box::new(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("root client cannot resolve {}", name.as_str()),
        ));
        futures::future::ready(Err::<Addrs, _>(err)).boxed()
    }
}

/// Resolver hook installed on the primary client's transport.
///
/// Invoked by the connection pool for every new connection to a hostname
/// endpoint, possibly many at once. Holds nothing mutable.
#[derive(Clone)]
pub struct BootstrapResolver {
    root: Arc<dyn Lookup>,
    timeout: Duration,
}

impl BootstrapResolver {
    pub fn new(root: Arc<dyn Lookup>, timeout: Duration) -> Self {
        Self { root, timeout }
    }

    /// Resolve a `host:port` connection target to a socket address.
    ///
    /// IP literals pass straight through; names get exactly one "A" lookup
    /// through the root client and a randomly chosen answer. The port is kept.
    pub async fn resolve_target(&self, target: &str) -> Result<SocketAddr> {
        let (host, port) = split_host_port(target)?;
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let ip = resolve_host(self.root.as_ref(), host, self.timeout).await?;
        Ok(SocketAddr::new(ip, port))
    }
}

impl Resolve for BootstrapResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let root = self.root.clone();
        let timeout = self.timeout;

        async move {
            let host = name.as_str();
            // The connector fills in the URL's port for port 0.
            let ip = match host.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(_) => resolve_host(root.as_ref(), host, timeout).await?,
            };
            let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn StdError + Send + Sync>>(addrs)
        }
        .boxed()
    }
}

async fn resolve_host(root: &dyn Lookup, host: &str, timeout: Duration) -> Result<IpAddr> {
    // TODO: fall back to an AAAA lookup for IPv6-only upstream hosts.
    let answers = tokio::time::timeout(timeout, root.lookup(host, "A", timeout))
        .await
        .map_err(|_| Error::Timeout(timeout))??;
    let candidates: Vec<IpAddr> = answers
        .iter()
        .filter_map(|a| a.parse::<Ipv4Addr>().ok())
        .map(IpAddr::V4)
        .collect();

    if candidates.is_empty() {
        warn!(host, answers = answers.len(), "No usable bootstrap answers");
        return Err(Error::Resolver);
    }

    let ip = candidates[fastrand::usize(..candidates.len())];
    debug!(host, %ip, "Translated upstream host");
    Ok(ip)
}

/// Split `host:port`, accepting bracketed IPv6 hosts (`[::1]:443`).
pub fn split_host_port(target: &str) -> Result<(&str, u16)> {
    let invalid = || {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid host:port target {target:?}"),
        ))
    };

    let (host, port) = match target.strip_prefix('[') {
        Some(rest) => rest.split_once("]:").ok_or_else(invalid)?,
        None => {
            let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
            if host.contains(':') {
                return Err(invalid());
            }
            (host, port)
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}
