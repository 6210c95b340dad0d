//! Client-facing transport for the relay.
//!
//! Receives DNS queries from clients and hands each one to a [`Forwarder`].

pub mod udp;

/// Maximum size of a DNS packet read from a client (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::dns::DnsQuery;
use crate::error::Result;

/// Relays one opaque query upstream and returns the raw answer.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, query: &[u8], timeout: Duration) -> Result<Bytes>;
}

/// Logger for per-query events. Silent unless verbose.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    verbose: bool,
}

impl QueryLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn forwarded(&self, query: &[u8], total_ms: f64, from: SocketAddr) {
        if self.verbose {
            let (domain, qtype) = describe(query);
            info!(
                domain = %domain,
                qtype,
                peer = %from,
                total_ms = format_args!("{total_ms:.3}"),
                "FORWARDED"
            );
        }
    }

    pub fn failed(&self, query: &[u8], total_ms: f64, from: SocketAddr) {
        if self.verbose {
            let (domain, qtype) = describe(query);
            info!(
                domain = %domain,
                qtype,
                peer = %from,
                total_ms = format_args!("{total_ms:.3}"),
                "SERVFAIL"
            );
        }
    }
}

/// Domain and numeric QTYPE for a log line; QTYPE 0 when unparsable.
fn describe(query: &[u8]) -> (String, u16) {
    DnsQuery::parse(query)
        .map(|q| (q.domain, q.qtype))
        .unwrap_or_else(|| ("<unknown>".to_string(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_reports_domain_and_type() {
        let mut query = vec![0xab, 0xcd, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        query.extend_from_slice(b"\x03www\x07Example\x03com\x00");
        query.extend_from_slice(&[0x00, 0x1c, 0x00, 0x01]);

        assert_eq!(describe(&query), ("www.example.com".to_string(), 28));
    }

    #[test]
    fn describe_tolerates_garbage() {
        assert_eq!(describe(&[0x01, 0x02]), ("<unknown>".to_string(), 0));
    }
}
