//! The probe packet factory
//!
//! Builds one UDP-over-IP datagram per (path index, TTL) pair. The path
//! identifier is encoded three times over:
//!
//! - in the UDP destination port (`base + path_index`), the field ECMP
//!   hashes on. In broken-NAT mode the source port varies instead,
//!   leaving the destination port fixed at the base;
//! - in the IPv4 identification field (or the first two IPv6 payload
//!   bytes) as `(path_index << 8) | ttl`, which routers quote back in
//!   ICMP errors and NAT does not rewrite;
//! - in the UDP checksum, forced via a payload tuning word to equal the
//!   flow identifier (`base + path_index`).
//!
//! The redundant copies are what let the correlator recover the probe
//! identity after a NAT has rewritten the ports.

use crate::probe::{checksum, ProbePacket};
use crate::traceroute::TracerouteConfig;
use anyhow::{ensure, Context, Result};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::udp::{self, MutableUdpPacket};
use std::net::IpAddr;

const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;
/// IPv4 payload: just the checksum tuning word.
const V4_PAYLOAD_LEN: usize = 2;
/// IPv6 payload: path index, TTL, then the tuning word.
const V6_PAYLOAD_LEN: usize = 4;

/// Deterministic factory for probe packets.
///
/// Pure construction: no side effects, and byte-identical output for
/// identical inputs.
#[derive(Debug, Clone)]
pub struct ProbeBuilder {
    source: IpAddr,
    target: IpAddr,
    src_port: u16,
    dst_port: u16,
    npaths: u8,
    min_ttl: u8,
    max_ttl: u8,
    broken_nat: bool,
}

impl ProbeBuilder {
    /// Create a builder for the given config, source and target address.
    ///
    /// The address family of `source` and `target` must both match the
    /// config's family flag.
    pub fn new(config: &TracerouteConfig, source: IpAddr, target: IpAddr) -> Result<Self> {
        ensure!(
            target.is_ipv6() == config.ipv6 && source.is_ipv6() == config.ipv6,
            "address family does not match configuration"
        );
        Ok(Self {
            source,
            target,
            src_port: config.src_port,
            dst_port: config.dst_port,
            npaths: config.npaths,
            min_ttl: config.min_ttl,
            max_ttl: config.max_ttl,
            broken_nat: config.broken_nat,
        })
    }

    /// Build the probe for one (path index, TTL) pair.
    pub fn build(&self, path_index: u8, ttl: u8) -> Result<ProbePacket> {
        ensure!(
            path_index < self.npaths,
            "path index {path_index} out of range (npaths {})",
            self.npaths
        );
        ensure!(
            (self.min_ttl..=self.max_ttl).contains(&ttl),
            "ttl {ttl} outside [{}, {}]",
            self.min_ttl,
            self.max_ttl
        );

        let flow_id = self.dst_port + u16::from(path_index);
        let (src_port, dst_port) = if self.broken_nat {
            // NAT may rewrite ports, so the destination port stays fixed
            // and the source port varies the ECMP hash instead.
            (self.src_port + u16::from(path_index), self.dst_port)
        } else {
            (self.src_port, flow_id)
        };
        let identifier = (u16::from(path_index) << 8) | u16::from(ttl);

        let bytes = match (self.source, self.target) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => self.build_v4(
                src, dst, src_port, dst_port, ttl, identifier, flow_id,
                path_index,
            )?,
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                self.build_v6(src, dst, src_port, dst_port, ttl, flow_id, path_index)?
            }
            _ => unreachable!("family mismatch rejected at construction"),
        };

        Ok(ProbePacket {
            path_index,
            ttl,
            src_port,
            dst_port,
            flow_id,
            identifier,
            bytes,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_v4(
        &self,
        src: std::net::Ipv4Addr,
        dst: std::net::Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        ttl: u8,
        identifier: u16,
        flow_id: u16,
        path_index: u8,
    ) -> Result<Vec<u8>> {
        let total_len = IPV4_HEADER_LEN + UDP_HEADER_LEN + V4_PAYLOAD_LEN;
        let mut buf = vec![0u8; total_len];

        {
            let mut ip =
                MutableIpv4Packet::new(&mut buf).context("IPv4 buffer too small")?;
            ip.set_version(4);
            ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
            ip.set_total_length(total_len as u16);
            ip.set_identification(identifier);
            ip.set_ttl(ttl);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(src);
            ip.set_destination(dst);
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buf[IPV4_HEADER_LEN..])
                .context("UDP buffer too small")?;
            udp.set_source(src_port);
            udp.set_destination(dst_port);
            udp.set_length((UDP_HEADER_LEN + V4_PAYLOAD_LEN) as u16);
            udp.set_checksum(0);
            udp.set_payload(&[0, 0]);
            let zero_word = udp::ipv4_checksum(&udp.to_immutable(), &src, &dst);
            udp.set_payload(&checksum::tuning_word(flow_id, zero_word));
            udp.set_checksum(flow_id);
            debug_assert_eq!(
                udp::ipv4_checksum(&udp.to_immutable(), &src, &dst),
                flow_id,
                "forced checksum mismatch for path {path_index} ttl {ttl}"
            );
        }
        {
            let mut ip =
                MutableIpv4Packet::new(&mut buf).context("IPv4 buffer too small")?;
            let header_checksum = ipv4::checksum(&ip.to_immutable());
            ip.set_checksum(header_checksum);
        }

        Ok(buf)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_v6(
        &self,
        src: std::net::Ipv6Addr,
        dst: std::net::Ipv6Addr,
        src_port: u16,
        dst_port: u16,
        hop_limit: u8,
        flow_id: u16,
        path_index: u8,
    ) -> Result<Vec<u8>> {
        let total_len = IPV6_HEADER_LEN + UDP_HEADER_LEN + V6_PAYLOAD_LEN;
        let mut buf = vec![0u8; total_len];

        {
            let mut ip =
                MutableIpv6Packet::new(&mut buf).context("IPv6 buffer too small")?;
            ip.set_version(6);
            ip.set_payload_length((UDP_HEADER_LEN + V6_PAYLOAD_LEN) as u16);
            ip.set_next_header(IpNextHeaderProtocols::Udp);
            ip.set_hop_limit(hop_limit);
            ip.set_source(src);
            ip.set_destination(dst);
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buf[IPV6_HEADER_LEN..])
                .context("UDP buffer too small")?;
            udp.set_source(src_port);
            udp.set_destination(dst_port);
            udp.set_length((UDP_HEADER_LEN + V6_PAYLOAD_LEN) as u16);
            udp.set_checksum(0);
            // There is no identification field in the IPv6 header, so the
            // (path index, TTL) pair rides in the payload instead.
            udp.set_payload(&[path_index, hop_limit, 0, 0]);
            let zero_word = udp::ipv6_checksum(&udp.to_immutable(), &src, &dst);
            let word = checksum::tuning_word(flow_id, zero_word);
            udp.set_payload(&[path_index, hop_limit, word[0], word[1]]);
            udp.set_checksum(flow_id);
            debug_assert_eq!(
                udp::ipv6_checksum(&udp.to_immutable(), &src, &dst),
                flow_id,
                "forced checksum mismatch for path {path_index} hop limit {hop_limit}"
            );
        }

        Ok(buf)
    }
}
