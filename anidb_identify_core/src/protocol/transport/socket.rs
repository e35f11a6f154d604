//! UDP socket transport

use super::Transport;
use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::{ProtocolError, Result};
use async_trait::async_trait;
use log::{debug, trace};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::UdpSocket;

/// Transport statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
}

/// Connected UDP socket
pub struct UdpTransport {
    socket: UdpSocket,
    stats: Mutex<TransportStats>,
}

impl UdpTransport {
    /// Bind `local_port` (0 for ephemeral) and connect to `host:port`
    pub async fn connect(host: &str, port: u16, local_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], local_port))).await?;
        socket.connect((host, port)).await?;
        debug!(
            "UDP transport {} -> {host}:{port}",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            stats: Mutex::new(TransportStats::default()),
        })
    }

    /// Wrap an already connected socket
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            stats: Mutex::new(TransportStats::default()),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.with_stats(|stats| stats.clone())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }

    fn with_stats<R>(&self, f: impl FnOnce(&mut TransportStats) -> R) -> R {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut stats)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        if datagram.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::packet_too_large(datagram.len(), MAX_PACKET_SIZE));
        }
        match self.socket.send(datagram).await {
            Ok(sent) => {
                trace!("Sent {sent} bytes");
                self.with_stats(|stats| {
                    stats.packets_sent += 1;
                    stats.bytes_sent += sent as u64;
                });
                Ok(())
            }
            Err(e) => {
                self.with_stats(|stats| stats.send_errors += 1);
                Err(e.into())
            }
        }
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        // One byte more than the limit so an oversized reply still reads as full
        let mut buffer = vec![0u8; MAX_PACKET_SIZE + 1];
        match self.socket.recv(&mut buffer).await {
            Ok(size) => {
                trace!("Received {size} bytes");
                self.with_stats(|stats| {
                    stats.packets_received += 1;
                    stats.bytes_received += size as u64;
                });
                buffer.truncate(size);
                Ok(buffer)
            }
            Err(e) => {
                self.with_stats(|stats| stats.receive_errors += 1);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pair() -> Option<(UdpTransport, UdpSocket)> {
        let server = match UdpSocket::bind("127.0.0.1:0").await {
            Ok(socket) => socket,
            Err(e) => {
                eprintln!("Skipping UDP test due to network sandbox: {e:?}");
                return None;
            }
        };
        let port = server.local_addr().ok()?.port();
        let client = UdpSocket::bind("127.0.0.1:0").await.ok()?;
        client.connect(("127.0.0.1", port)).await.ok()?;
        server.connect(client.local_addr().ok()?).await.ok()?;
        Some((UdpTransport::from_socket(client), server))
    }

    #[tokio::test]
    async fn test_send_and_receive_update_stats() {
        let Some((transport, server)) = pair().await else {
            return;
        };

        transport.send(b"LOGOUT tag=1").await.unwrap();
        let mut buffer = [0u8; 64];
        let size = server.recv(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..size], b"LOGOUT tag=1");

        server.send(b"1 203 LOGGED OUT").await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), b"1 203 LOGGED OUT");

        let stats = transport.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 16);
    }

    #[tokio::test]
    async fn test_oversized_packets_are_refused() {
        let Some((transport, _server)) = pair().await else {
            return;
        };
        let large = vec![b'x'; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            transport.send(&large).await,
            Err(ProtocolError::PacketTooLarge { .. })
        ));
        assert_eq!(transport.stats().packets_sent, 0);
    }
}
