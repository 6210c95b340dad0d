//! Relay orchestration.
//!
//! Builds the root and primary clients, binds the UDP transport and runs the
//! relay until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bootstrap::RootClient;
use crate::client::DohClient;
use crate::config::ProxyConfig;
use crate::endpoint::EndpointSet;
use crate::error::Result;
use crate::stats::Stats;
use crate::transport::udp::{ServeOptions, UdpTransport};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Run the relay with the given configuration.
///
/// Configuration and bind errors are returned before anything is served.
/// Afterwards this only returns once Ctrl-C is received.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let root_endpoints = EndpointSet::parse(&config.root_endpoints)?;
    let primary_endpoints = EndpointSet::parse(&config.primary_endpoints)?;

    let root = RootClient::new(root_endpoints, &config.client)?;
    let client = Arc::new(DohClient::primary(primary_endpoints, root, &config.client)?);

    let udp = UdpTransport::bind(config.listen).await?;
    info!(listen = %udp.local_addr()?, "DoH relay listening");
    let upstream_strs: Vec<_> = client.endpoints().iter().map(|e| e.to_string()).collect();
    info!(upstreams = %upstream_strs.join(", "), "Upstream endpoints");

    let stats = Arc::new(Stats::new());
    let server = udp.start(
        client,
        stats.clone(),
        ServeOptions {
            max_in_flight: config.max_in_flight,
            query_timeout: config.query_timeout,
            verbose: config.verbose,
        },
    );

    // Log stats every minute
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = stats.snapshot_and_reset();
            info!(
                uptime_secs = stats.uptime_secs,
                requests = stats.requests,
                forwarded = stats.forwarded,
                failed = stats.failed,
                avg_response_ms = format_args!("{:.2}", stats.avg_response_ms),
                "stats"
            );
        }
    });

    let shutdown = tokio::signal::ctrl_c().await;
    info!("Shutting down");
    server.abort();
    reporter.abort();

    Ok(shutdown?)
}
