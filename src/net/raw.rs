//! Raw socket implementations of the send and capture primitives

use super::{PacketSource, ProbeSender};
use crate::probe::ProbePacket;
use anyhow::{Context, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// IPv6 header length; the raw sender transmits only the UDP part and
/// lets the kernel prepend the header.
const IPV6_HEADER_LEN: usize = 40;

/// Raw socket sender for crafted probe datagrams.
///
/// IPv4 uses a header-included raw socket so the crafted IP header (TTL,
/// identification) goes out verbatim. IPv6 raw sockets cannot include the
/// header, so the hop limit is set per send and the kernel builds the
/// header around the crafted UDP datagram.
pub struct RawProbeSender {
    socket: Socket,
    ipv6: bool,
}

impl RawProbeSender {
    /// Open the raw send socket for the given address family.
    pub fn open(ipv6: bool) -> Result<Self> {
        let socket = if ipv6 {
            Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::UDP))
                .context("failed to open raw IPv6 socket")?
        } else {
            let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::UDP))
                .context("failed to open raw IPv4 socket")?;
            socket
                .set_header_included_v4(true)
                .context("failed to enable IP_HDRINCL")?;
            socket
        };
        Ok(Self { socket, ipv6 })
    }
}

impl ProbeSender for RawProbeSender {
    fn send(&self, probe: &ProbePacket, target: IpAddr) -> Result<()> {
        let dest = SockAddr::from(SocketAddr::new(target, 0));
        if self.ipv6 {
            self.socket
                .set_unicast_hops_v6(u32::from(probe.ttl))
                .context("failed to set hop limit")?;
            self.socket
                .send_to(&probe.bytes[IPV6_HEADER_LEN..], &dest)
                .context("failed to send probe")?;
        } else {
            self.socket
                .send_to(&probe.bytes, &dest)
                .context("failed to send probe")?;
        }
        Ok(())
    }
}

/// Raw ICMP/ICMPv6 capture socket.
///
/// This receives the ICMP time-exceeded and destination-unreachable
/// traffic our probes elicit. Matching against the probe set happens
/// later in the correlator; unrelated ICMP captured here is discarded
/// there.
pub struct RawIcmpSource {
    socket: Socket,
}

impl RawIcmpSource {
    /// Open the capture socket for the given address family.
    ///
    /// Failure here (typically missing privileges) must abort the run
    /// before any probe is sent.
    pub fn open(ipv6: bool) -> Result<Self> {
        let socket = if ipv6 {
            Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
                .context("failed to open raw ICMPv6 socket")?
        } else {
            Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
                .context("failed to open raw ICMP socket")?
        };
        Ok(Self { socket })
    }
}

impl PacketSource for RawIcmpSource {
    fn recv(&mut self, timeout: Duration) -> Result<Option<(Vec<u8>, IpAddr)>> {
        // A zero timeout is not representable for SO_RCVTIMEO.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket
            .set_read_timeout(Some(timeout))
            .context("failed to set capture timeout")?;

        let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
        match self.socket.recv_from(&mut buf) {
            Ok((size, socket_addr)) => {
                let from = match socket_addr.as_socket() {
                    Some(addr) => addr.ip(),
                    None => return Ok(None),
                };
                let initialized = &buf[..size];
                // recv_from guarantees the first `size` bytes are initialized.
                let bytes: &[u8] = unsafe {
                    &*(initialized as *const [MaybeUninit<u8>] as *const [u8])
                };
                Ok(Some((bytes.to_vec(), from)))
            }
            Err(e)
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("capture read failed"),
        }
    }
}
