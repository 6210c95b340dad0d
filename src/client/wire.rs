//! Wire-format DoH: the query message is POSTed as-is and the response body
//! is handed back untouched.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use super::{DohClient, ensure_ok};
use crate::error::{Error, Result};
use crate::transport::Forwarder;

/// Content type for DNS wire-format bodies (RFC 8484 §6).
pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

impl DohClient {
    /// Forward an opaque DNS message to a random endpoint.
    ///
    /// The response body is returned verbatim; whether it is a sensible DNS
    /// message is up to the upstream. `timeout` bounds the whole round trip.
    pub async fn raw_query(&self, query: &[u8], timeout: Duration) -> Result<Bytes> {
        let deadline = Instant::now() + timeout;
        let endpoint = self.endpoints.pick();

        debug!(endpoint = %endpoint, query_len = query.len(), "Sending DoH query");

        let response = timeout_at(
            deadline,
            self.http
                .post(endpoint.url().clone())
                .header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                .header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
                .body(query.to_vec())
                .send(),
        )
        .await
        .map_err(|_| Error::Timeout(timeout))??;

        ensure_ok(&response, endpoint)?;

        let body = timeout_at(deadline, response.bytes())
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        debug!(endpoint = %endpoint, response_len = body.len(), "DoH response received");

        Ok(body)
    }
}

#[async_trait]
impl Forwarder for DohClient {
    async fn forward(&self, query: &[u8], timeout: Duration) -> Result<Bytes> {
        self.raw_query(query, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubUpstream;
    use crate::config::ClientConfig;
    use crate::endpoint::{Endpoint, EndpointSet};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn client_for(urls: &[String]) -> DohClient {
        let endpoints = urls.iter().map(|u| Endpoint::plaintext(u)).collect();
        let http = crate::client::http_builder(&ClientConfig::default())
            .build()
            .unwrap();
        DohClient::new(http, EndpointSet::new(endpoints).unwrap())
    }

    #[tokio::test]
    async fn raw_query_returns_body_verbatim() {
        let answer = vec![0x12, 0x34, 0x81, 0x80, 0x00, 0x00, 0xff, 0xfe, 0x00];
        let stub = StubUpstream::start(200, DNS_MESSAGE_CONTENT_TYPE, answer.clone()).await;
        let client = client_for(&[stub.url("/dns-query")]);

        let body = client.raw_query(b"\x12\x34query", TIMEOUT).await.unwrap();

        assert_eq!(body.as_ref(), answer.as_slice());
    }

    #[tokio::test]
    async fn raw_query_posts_wire_format() {
        let stub = StubUpstream::start(200, DNS_MESSAGE_CONTENT_TYPE, vec![1, 2, 3]).await;
        let client = client_for(&[stub.url("/dns-query")]);

        client.raw_query(&[0xab, 0xcd, 0x01], TIMEOUT).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let head = requests[0].head.to_ascii_lowercase();
        assert!(head.starts_with("post /dns-query "));
        assert!(head.contains("content-type: application/dns-message"));
        assert_eq!(requests[0].body, vec![0xab, 0xcd, 0x01]);
    }

    #[tokio::test]
    async fn raw_query_non_200_is_resolver_error() {
        let stub = StubUpstream::start(500, "text/plain", "garbage body").await;
        let client = client_for(&[stub.url("/dns-query")]);

        let result = client.raw_query(&[0, 1], TIMEOUT).await;

        assert!(matches!(result, Err(Error::Resolver)));
    }

    #[tokio::test]
    async fn raw_query_times_out() {
        let stub = StubUpstream::start_delayed(
            200,
            DNS_MESSAGE_CONTENT_TYPE,
            vec![1],
            Duration::from_secs(2),
        )
        .await;
        let client = client_for(&[stub.url("/dns-query")]);

        let result = client.raw_query(&[0, 1], Duration::from_millis(100)).await;

        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn raw_query_stalled_body_times_out() {
        let stub = StubUpstream::start_stalled(
            DNS_MESSAGE_CONTENT_TYPE,
            100,
            vec![0x12, 0x34, 0x81, 0x80, 0x00],
            Duration::from_secs(3),
        )
        .await;
        let client = client_for(&[stub.url("/dns-query")]);
        let started = std::time::Instant::now();

        let result = client.raw_query(&[0, 1], Duration::from_millis(200)).await;

        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn raw_query_connect_failure_is_http_error() {
        // Bind then drop to get a port nobody is listening on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client_for(&[format!("http://127.0.0.1:{port}/dns-query")]);

        let result = client.raw_query(&[0, 1], TIMEOUT).await;

        assert!(matches!(result, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn raw_query_spreads_across_endpoints() {
        let first = StubUpstream::start(200, DNS_MESSAGE_CONTENT_TYPE, vec![1]).await;
        let second = StubUpstream::start(200, DNS_MESSAGE_CONTENT_TYPE, vec![2]).await;
        let client = client_for(&[first.url("/dns-query"), second.url("/dns-query")]);

        for _ in 0..40 {
            client.raw_query(&[0, 1], TIMEOUT).await.unwrap();
        }

        assert_eq!(first.requests().len() + second.requests().len(), 40);
        assert!(!first.requests().is_empty());
        assert!(!second.requests().is_empty());
    }
}
