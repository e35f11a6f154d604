//! Datagram transport
//!
//! The client only needs to send one datagram and wait for the next one.
//! [`UdpTransport`] does that over a connected tokio socket; tests swap in
//! an in-memory implementation.

mod socket;

pub use socket::{TransportStats, UdpTransport};

use crate::protocol::error::Result;
use async_trait::async_trait;

/// One-datagram-at-a-time transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram to the server
    async fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Wait for the next datagram from the server
    ///
    /// Must be cancel safe: the client polls this inside `select!`.
    async fn recv(&self) -> Result<Vec<u8>>;
}
