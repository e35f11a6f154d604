//! AniDB UDP protocol implementation
//!
//! - `messages`: command builders, reply parsing and the records replies fill
//! - `mask`: fmask/amask layouts and the generic field walker
//! - `codec`: datagram framing and optional DEFLATE compression
//! - `queue`: the retrying packet queue keyed by tag
//! - `session`: login and ban state shared with the rest of the process
//! - `transport`: UDP socket abstraction
//! - `client`: the periodic send/receive loop tying the above together

pub mod client;
pub mod codec;
pub mod error;
pub mod mask;
pub mod messages;
pub mod queue;
pub mod session;
pub mod transport;

pub use client::{ApiClient, ClientHandle, ClientStatus, ProtocolConfig};
pub use error::{ProtocolError, ResponseCode, Result};
pub use mask::Mask;
pub use queue::{Expiry, PacketQueue, PendingPacket, Tag};
pub use session::{Session, SessionHandle};
pub use transport::{Transport, TransportStats, UdpTransport};

/// Protocol version supported by this implementation
pub const PROTOCOL_VERSION: &str = "3";

/// Maximum UDP packet size (considering PPPoE)
pub const MAX_PACKET_SIZE: usize = 1400;

/// Default AniDB server address
pub const DEFAULT_SERVER: &str = "api.anidb.net";

/// Default AniDB UDP port
pub const DEFAULT_PORT: u16 = 9000;

/// Resends allowed per tag before it is marked TIMEOUT
pub const MAX_RETRIES: u32 = 3;

/// Time a sent packet may wait for its reply
pub const REPLY_TIMEOUT_MS: u64 = 10_000;

/// Interval between two sends; AniDB asks for no more than one packet every two seconds
pub const SEND_INTERVAL_MS: u64 = 2_100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, "3");
        assert_eq!(MAX_PACKET_SIZE, 1400);
        assert_eq!(DEFAULT_SERVER, "api.anidb.net");
        assert_eq!(DEFAULT_PORT, 9000);
        assert_eq!(MAX_RETRIES, 3);
        assert!(SEND_INTERVAL_MS >= 2_000);
    }
}
