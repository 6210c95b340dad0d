//! DNS-over-HTTPS client.
//!
//! A [`DohClient`] binds an HTTPS transport to a set of upstream endpoints.
//! It speaks two flavours of DoH:
//! - the DNS wire format via [`DohClient::raw_query`], where the caller
//!   supplies the query message and interprets the response
//! - DNS-JSON via [`DohClient::query`], which returns answer values only

mod json;
pub mod record_type;
mod wire;

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::warn;

use crate::bootstrap::{BootstrapResolver, RootClient};
use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, EndpointSet};
use crate::error::{Error, Result};

pub use json::parse_answers;
pub use wire::DNS_MESSAGE_CONTENT_TYPE;

/// Accept header value for DNS-JSON requests.
pub const DNS_JSON_CONTENT_TYPE: &str = "application/dns-json";

/// A DoH client over a fixed endpoint set.
#[derive(Debug, Clone)]
pub struct DohClient {
    http: reqwest::Client,
    endpoints: EndpointSet,
}

impl DohClient {
    /// Wrap an already configured HTTP client.
    pub fn new(http: reqwest::Client, endpoints: EndpointSet) -> Self {
        Self { http, endpoints }
    }

    /// Build the client used for all public traffic.
    ///
    /// Hostname endpoints are resolved at connect time through `root`,
    /// never through the system resolver.
    pub fn primary(endpoints: EndpointSet, root: RootClient, config: &ClientConfig) -> Result<Self> {
        let resolver = BootstrapResolver::new(Arc::new(root), config.bootstrap_timeout);
        let http = http_builder(config)
            .https_only(true)
            .dns_resolver(Arc::new(resolver))
            .build()?;

        Ok(Self::new(http, endpoints))
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }
}

/// Transport settings common to every client.
pub(crate) fn http_builder(config: &ClientConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .no_proxy()
        .connect_timeout(config.connect_timeout)
        .tcp_keepalive(config.tcp_keepalive)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .redirect(reqwest::redirect::Policy::none())
}

/// Anything but 200 is a resolver failure. The body is left unread.
fn ensure_ok(response: &reqwest::Response, endpoint: &Endpoint) -> Result<()> {
    if response.status() != StatusCode::OK {
        warn!(
            endpoint = %endpoint,
            status = %response.status(),
            version = ?response.version(),
            headers = ?response.headers(),
            "Upstream rejected query"
        );
        return Err(Error::Resolver);
    }
    Ok(())
}
