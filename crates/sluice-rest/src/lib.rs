//! Control-plane client for a remote tunnel-provisioning service.
//!
//! The client creates a named tunnel, waits for it to become operational,
//! and then supervises it for the duration of its life: polling the remote
//! status, reporting local liveness through heartbeats, and delivering the
//! terminal status back to the caller once the remote side tears the tunnel
//! down.
//!
//! ```no_run
//! use std::time::Duration;
//! use sluice_rest::{RestClient, TunnelRequest};
//!
//! # async fn run() -> Result<(), sluice_rest::RestError> {
//! let client = RestClient::new("https://saucelabs.com/rest/v1", "user", "key");
//! let mut tunnel = client
//!     .create(&TunnelRequest::default(), Duration::from_secs(60))
//!     .await?;
//! println!("tunnel {} is up", tunnel.id());
//!
//! // Blocks until the remote side terminates the tunnel.
//! if let Some(status) = tunnel.wait_terminated().await {
//!     println!("tunnel left the running state: {status}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod codec;
mod directory;
mod error;
mod lifecycle;
mod supervise;

pub use client::{
    RestClient, SuperviseIntervals, VersionInfo, DEFAULT_REST_URL, DEFAULT_TUNNEL_DOMAIN,
};
pub use codec::{Codec, PlainCodec, VerboseCodec};
pub use directory::TunnelEntry;
pub use error::RestError;
pub use lifecycle::{Metadata, TunnelRequest, TunnelState, TunnelStatus};
pub use supervise::{ClientStatus, Tunnel};
