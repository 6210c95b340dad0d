use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use doh_relay::config::ProxyConfig;
use doh_relay::proxy;

#[derive(Parser)]
#[command(name = "doh-relay")]
#[command(about = "Relay UDP DNS queries to DNS-over-HTTPS resolvers", long_about = None)]
struct Args {
    /// UDP address to listen on (host:port)
    #[arg(short, long, default_value = "0.0.0.0:53")]
    listen: String,

    /// Maximum number of queries forwarded concurrently
    #[arg(long, default_value_t = 512)]
    max_in_flight: usize,

    /// Upstream deadline per query, in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Log every query (domain, peer, timing)
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(args: Args) -> doh_relay::Result<()> {
    let config = ProxyConfig::new(
        &args.listen,
        args.max_in_flight,
        Duration::from_secs(args.timeout),
        args.verbose,
    )?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(proxy::run(config))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
