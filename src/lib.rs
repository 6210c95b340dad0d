//! doh-relay - relays plain UDP DNS queries to DNS-over-HTTPS resolvers.
//!
//! Queries arrive over UDP, are POSTed in wire format to a randomly chosen
//! DoH endpoint, and the answer goes back to the sender untouched. Upstreams
//! known only by hostname are resolved at connect time through a separate,
//! IP-literal-only DNS-JSON client, never the system resolver.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod proxy;
pub mod stats;
pub mod transport;

pub use bootstrap::{BootstrapResolver, Lookup, RootClient};
pub use client::DohClient;
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{Error, Result};
