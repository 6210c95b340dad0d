//! UDP transport for DNS queries.
//!
//! Every datagram is forwarded in its own task and answered with exactly one
//! datagram sent back to the source address. Since UDP is connectionless, the
//! source address is the only thing tying a reply to its query. A semaphore
//! caps the number of queries in flight; when it is exhausted the receive loop
//! stops reading and further datagrams wait in the socket buffer.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Forwarder, MAX_DNS_PACKET_SIZE, QueryLogger};
use crate::dns;
use crate::stats::Stats;

/// Knobs for the receive loop.
#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    pub max_in_flight: usize,
    pub query_timeout: Duration,
    pub verbose: bool,
}

/// UDP transport for the relay.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start serving. The returned task runs until aborted.
    pub fn start<F>(self, forwarder: Arc<F>, stats: Arc<Stats>, options: ServeOptions) -> JoinHandle<()>
    where
        F: Forwarder + 'static,
    {
        tokio::spawn(run(self.socket, forwarder, stats, options))
    }
}

/// Receive loop: one spawned task per datagram.
async fn run<F>(socket: Arc<UdpSocket>, forwarder: Arc<F>, stats: Arc<Stats>, options: ServeOptions)
where
    F: Forwarder + 'static,
{
    let limiter = Arc::new(Semaphore::new(options.max_in_flight));
    let logger = QueryLogger::new(options.verbose);
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let Ok(permit) = limiter.clone().acquire_owned().await else {
            return;
        };

        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        let query = Bytes::copy_from_slice(&buf[..len]);
        let socket = socket.clone();
        let forwarder = forwarder.clone();
        let stats = stats.clone();

        tokio::spawn(async move {
            handle_query(&socket, forwarder.as_ref(), query, src, &stats, logger, options.query_timeout)
                .await;
            drop(permit);
        });
    }
}

async fn handle_query<F: Forwarder + ?Sized>(
    socket: &UdpSocket,
    forwarder: &F,
    query: Bytes,
    src: SocketAddr,
    stats: &Stats,
    logger: QueryLogger,
    timeout: Duration,
) {
    let start_time = Instant::now();

    let response = match forwarder.forward(&query, timeout).await {
        Ok(response) => {
            let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
            stats.record_forwarded(elapsed_ms);
            logger.forwarded(&query, elapsed_ms, src);
            response
        }
        Err(e) => {
            let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
            warn!(peer = %src, error = %e, "Query error");
            stats.record_failed(elapsed_ms);
            logger.failed(&query, elapsed_ms, src);
            Bytes::from(dns::servfail(&query))
        }
    };

    match socket.send_to(&response, src).await {
        Ok(_) => debug!(peer = %src, len = response.len(), "Reply sent"),
        Err(e) => warn!(peer = %src, error = %e, "UDP send error"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{Error, Result};

    const OPTIONS: ServeOptions = ServeOptions {
        max_in_flight: 64,
        query_timeout: Duration::from_secs(5),
        verbose: true,
    };

    /// Replies with the query reversed, after a short jittered delay so that
    /// replies complete out of order.
    struct Reverser;

    #[async_trait]
    impl Forwarder for Reverser {
        async fn forward(&self, query: &[u8], _timeout: Duration) -> Result<Bytes> {
            tokio::time::sleep(Duration::from_millis(fastrand::u64(0..20))).await;
            Ok(query.iter().rev().copied().collect::<Vec<_>>().into())
        }
    }

    struct Failing;

    #[async_trait]
    impl Forwarder for Failing {
        async fn forward(&self, _query: &[u8], _timeout: Duration) -> Result<Bytes> {
            Err(Error::Resolver)
        }
    }

    /// Tracks the peak number of concurrent forwards.
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Forwarder for Gauge {
        async fn forward(&self, query: &[u8], _timeout: Duration) -> Result<Bytes> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Bytes::copy_from_slice(query))
        }
    }

    async fn start<F: Forwarder + 'static>(forwarder: F, options: ServeOptions) -> (SocketAddr, Arc<Stats>) {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();
        let stats = Arc::new(Stats::new());
        transport.start(Arc::new(forwarder), stats.clone(), options);
        (addr, stats)
    }

    async fn exchange(server: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(payload, server).await.unwrap();
        let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
        let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, server);
        buf[..len].to_vec()
    }

    #[tokio::test]
    async fn replies_go_to_their_senders() {
        let (server, stats) = start(Reverser, OPTIONS).await;

        let exchanges = (0..100u32).map(|i| {
            let marker = format!("query-marker-{i:04}");
            async move {
                let reply = exchange(server, marker.as_bytes()).await;
                let expected: Vec<u8> = marker.bytes().rev().collect();
                assert_eq!(reply, expected);
            }
        });
        futures::future::join_all(exchanges).await;

        assert_eq!(stats.snapshot_and_reset().forwarded, 100);
    }

    #[tokio::test]
    async fn failure_replies_with_servfail() {
        let (server, stats) = start(Failing, OPTIONS).await;
        let mut query = vec![0xab, 0xcd, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        query.extend_from_slice(&[3, b'f', b'o', b'o', 0, 0, 1, 0, 1]);

        let reply = exchange(server, &query).await;

        assert_eq!(reply, dns::servfail(&query));
        assert_eq!(reply[3] & 0x0f, 2);
        assert_eq!(stats.snapshot_and_reset().failed, 1);
    }

    #[tokio::test]
    async fn in_flight_is_bounded() {
        let gauge = Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let options = ServeOptions {
            max_in_flight: 4,
            ..OPTIONS
        };
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server = transport.local_addr().unwrap();
        let gauge = Arc::new(gauge);
        transport.start(gauge.clone(), Arc::new(Stats::new()), options);

        let exchanges = (0..32u8).map(|i| async move {
            assert_eq!(exchange(server, &[i; 16]).await, vec![i; 16]);
        });
        futures::future::join_all(exchanges).await;

        assert!(gauge.peak.load(Ordering::SeqCst) <= 4);
    }
}
