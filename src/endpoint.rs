//! Upstream DoH endpoints and per-request endpoint selection.
//!
//! Every call picks an endpoint uniformly at random. Selection is not sticky,
//! not weighted and not failure-aware: spreading queries across operators
//! keeps any single provider from seeing all of our traffic, and a failed
//! request is likely to land elsewhere next time.

use std::fmt;
use std::net::IpAddr;

use reqwest::Url;

use crate::error::{Error, Result};

/// One upstream DoH service URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse an endpoint URL. Only `https` URLs with a host are accepted.
    pub fn parse(url: &str) -> Result<Self> {
        let endpoint = Self::parse_any_scheme(url)?;
        if endpoint.url.scheme() != "https" {
            return Err(Error::Config(format!("endpoint {url} is not https")));
        }
        Ok(endpoint)
    }

    /// Plain `http` endpoint for local stub servers.
    #[cfg(test)]
    pub(crate) fn plaintext(url: &str) -> Self {
        Self::parse_any_scheme(url).unwrap()
    }

    fn parse_any_scheme(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("endpoint {url}: {e}")))?;
        if url.host().is_none() {
            return Err(Error::Config(format!("endpoint {url} has no host")));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns true if the host is an IPv4 or IPv6 literal.
    pub fn is_ip_literal(&self) -> bool {
        self.ip().is_some()
    }

    /// The literal address of the host, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        let host = self.url.host_str()?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        host.parse().ok()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// A non-empty, read-only set of endpoints.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Build a set from already parsed endpoints.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Config("no endpoints configured".to_string()));
        }
        Ok(Self { endpoints })
    }

    /// Parse and validate a list of `https` URLs.
    pub fn parse<S: AsRef<str>>(urls: &[S]) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|u| Endpoint::parse(u.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(endpoints)
    }

    /// Pick an endpoint uniformly at random.
    pub fn pick(&self) -> &Endpoint {
        &self.endpoints[fastrand::usize(..self.endpoints.len())]
    }

    /// Pick an endpoint using the given generator.
    pub fn pick_with(&self, rng: &mut fastrand::Rng) -> &Endpoint {
        &self.endpoints[rng.usize(..self.endpoints.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Endpoints whose host is a name rather than an IP literal.
    pub fn hostnames(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(|e| !e.is_ip_literal())
    }
}
