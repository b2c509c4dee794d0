//! Query socket setup

use crate::config::CollectorConfig;
use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use tracing::debug;

/// The datagram operations the collector needs
pub trait DatagramSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

impl DatagramSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }
}

/// Create the query socket: enlarged receive buffer (replies arrive in a
/// burst), bound, with the per-receive timeout applied
pub fn open_socket(config: &CollectorConfig) -> Result<UdpSocket> {
    let bind_addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid collector bind address: {}", config.bind_address))?;

    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create UDP socket")?;

    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_bytes) {
        debug!("Could not raise receive buffer to {} bytes: {}", config.recv_buffer_bytes, e);
    }

    socket
        .bind(&bind_addr.into())
        .with_context(|| format!("Failed to bind UDP socket to {}", bind_addr))?;

    socket
        .set_read_timeout(Some(config.recv_timeout()))
        .context("Failed to set socket read timeout")?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_open_socket_applies_timeout() {
        let config = CollectorConfig {
            bind_address: "127.0.0.1:0".to_string(),
            recv_timeout_ms: 40,
            ..CollectorConfig::default()
        };

        // the kernel rounds SO_RCVTIMEO to whole jiffies
        let socket = open_socket(&config).unwrap();
        let timeout = socket.read_timeout().unwrap().unwrap();
        assert!(
            timeout.abs_diff(Duration::from_millis(40)) <= Duration::from_millis(10),
            "read timeout {timeout:?}"
        );
        assert!(socket.local_addr().unwrap().port() != 0);
    }

    #[test]
    fn test_open_socket_rejects_bad_address() {
        let config = CollectorConfig {
            bind_address: "not-an-address".to_string(),
            ..CollectorConfig::default()
        };
        assert!(open_socket(&config).is_err());
    }
}
