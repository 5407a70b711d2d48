//! Network primitives: raw send and capture
//!
//! The engine only ever talks to the wire through the [`ProbeSender`] and
//! [`PacketSource`] traits, so both sides can be replaced with mocks in
//! tests. The real implementations in [`raw`] are built on socket2 raw
//! sockets.

use crate::probe::ProbePacket;
use anyhow::Result;
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub mod raw;
pub mod sniffer;

pub use sniffer::Sniffer;

/// A raw packet captured from the wire during a run window.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// The captured bytes. For IPv4 this starts at the IP header, for
    /// IPv6 at the ICMPv6 header (the kernel strips the IPv6 header on
    /// raw sockets).
    pub bytes: Vec<u8>,
    /// Address the packet arrived from.
    pub from: IpAddr,
    /// When the packet was captured.
    pub timestamp: Instant,
}

/// Raw send primitive for crafted probe datagrams.
pub trait ProbeSender: Send + Sync {
    /// Transmit one probe towards `target`.
    fn send(&self, probe: &ProbePacket, target: IpAddr) -> Result<()>;
}

/// Capture primitive the sniffer thread polls.
pub trait PacketSource: Send {
    /// Wait up to `timeout` for the next matching packet. Returns
    /// `Ok(None)` on timeout.
    fn recv(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, IpAddr)>>;
}

/// Discover the local source address the kernel would use to reach
/// `target`, by connecting a throwaway UDP socket (no packets are sent).
pub fn local_source_addr(target: IpAddr) -> Result<IpAddr> {
    let bind_addr: std::net::SocketAddr = match target {
        IpAddr::V4(_) => "0.0.0.0:0".parse()?,
        IpAddr::V6(_) => "[::]:0".parse()?,
    };
    let socket = std::net::UdpSocket::bind(bind_addr)?;
    socket.connect((target, 33434u16))?;
    Ok(socket.local_addr()?.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_local_source_addr_loopback() {
        let addr = local_source_addr(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_local_source_addr_family() {
        // Whatever route exists, the answer must stay in-family.
        if let Ok(addr) = local_source_addr(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))) {
            assert!(addr.is_ipv4());
        }
    }
}
