//! Flow correlation: mapping captured responses back to sent probes
//!
//! Every captured packet is matched in priority order: first an exact
//! match on the quoted ports plus the embedded identifier, then the
//! NAT-resilient fallback on the identifier alone (IPv4 identification
//! field / IPv6 payload), then the forced-checksum fallback. Packets
//! matching none of these belong to unrelated traffic and are discarded.

use crate::net::CapturedPacket;
use crate::probe::SentProbe;
use crate::traceroute::types::{Flow, ResponseKind};
use crate::traceroute::TracerouteConfig;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::{Icmpv6Packet, Icmpv6Types};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const ICMP_ERROR_HEADER_LEN_BYTES: usize = 8;
const IPV4_HEADER_MIN_LEN_BYTES: usize = 20;
const IPV6_HEADER_LEN_BYTES: usize = 40;
const UDP_HEADER_LEN_BYTES: usize = 8;

/// ICMPv4 destination-unreachable code for port unreachable.
const ICMP_V4_PORT_UNREACHABLE: u8 = 3;
/// ICMPv6 destination-unreachable code for port unreachable.
const ICMP_V6_PORT_UNREACHABLE: u8 = 4;

/// Fields recovered from the probe fragment quoted inside an ICMP error.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    kind: ResponseKind,
    src_port: u16,
    dst_port: u16,
    checksum: u16,
    /// NAT-invariant copy of (path index << 8) | ttl.
    identifier: u16,
}

/// A resolved (path index, TTL) assignment for a captured packet.
#[derive(Debug, Clone, Copy)]
struct ProbeMatch {
    path_index: u8,
    ttl: u8,
    nat_detected: bool,
}

/// Correlate captured responses against the sent probe set.
///
/// Returns one [`Flow`] per configured path index, covering the full TTL
/// range; pairs without a matching response stay silent hops. When
/// several captured packets map to the same pair, the earliest capture
/// wins and later duplicates are discarded.
pub fn correlate_flows(
    config: &TracerouteConfig,
    target: IpAddr,
    sent: &[SentProbe],
    captured: &[CapturedPacket],
) -> BTreeMap<u8, Flow> {
    let mut flows: BTreeMap<u8, Flow> = (0..config.npaths)
        .map(|path| {
            (
                path,
                Flow::empty(path, config.flow_id(path), config.min_ttl, config.max_ttl),
            )
        })
        .collect();

    let sent_index: HashMap<(u8, u8), &SentProbe> = sent
        .iter()
        .map(|probe| ((probe.packet.path_index, probe.packet.ttl), probe))
        .collect();

    let mut ordered: Vec<&CapturedPacket> = captured.iter().collect();
    ordered.sort_by_key(|packet| packet.timestamp);

    for packet in ordered {
        let candidate = match target {
            IpAddr::V4(target) => decode_v4(target, packet),
            IpAddr::V6(target) => decode_v6(target, packet),
        };
        let Some(candidate) = candidate else {
            continue;
        };
        let Some(matched) = match_probe(config, &candidate) else {
            continue;
        };
        let Some(probe) = sent_index.get(&(matched.path_index, matched.ttl)) else {
            continue;
        };
        let Some(hop) = flows
            .get_mut(&matched.path_index)
            .and_then(|flow| flow.hop_at_mut(matched.ttl))
        else {
            continue;
        };
        if hop.addr.is_some() {
            // Duplicate or retransmitted response; first capture wins.
            continue;
        }
        hop.addr = Some(packet.from);
        hop.rtt = Some(packet.timestamp.saturating_duration_since(probe.sent_at));
        hop.response = Some(candidate.kind);
        hop.nat_detected = matched.nat_detected;
    }

    flows
}

/// Decode an IPv4 capture (a complete IP packet) into a match candidate.
fn decode_v4(target: Ipv4Addr, packet: &CapturedPacket) -> Option<Candidate> {
    let ip = Ipv4Packet::new(&packet.bytes)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    // Slice by the actual buffer, not the header's claimed total length,
    // so a truncated capture cannot index out of bounds.
    let outer_header_len = usize::from(ip.get_header_length()) * 4;
    let icmp_bytes = packet.bytes.get(outer_header_len..)?;
    let icmp = IcmpPacket::new(icmp_bytes)?;
    let kind = match icmp.get_icmp_type() {
        IcmpTypes::TimeExceeded => ResponseKind::TimeExceeded,
        IcmpTypes::DestinationUnreachable => {
            let code = icmp.get_icmp_code().0;
            if code == ICMP_V4_PORT_UNREACHABLE {
                ResponseKind::UdpPortUnreachable
            } else {
                ResponseKind::DestinationUnreachable(code)
            }
        }
        // Echo replies and the rest cannot answer a UDP probe.
        _ => return None,
    };

    if icmp_bytes.len()
        < ICMP_ERROR_HEADER_LEN_BYTES + IPV4_HEADER_MIN_LEN_BYTES + UDP_HEADER_LEN_BYTES
    {
        return None;
    }
    // The quoted original datagram starts after the 8-byte ICMP header.
    let inner_bytes = &icmp_bytes[ICMP_ERROR_HEADER_LEN_BYTES..];
    let inner = Ipv4Packet::new(inner_bytes)?;
    if inner.get_destination() != target
        || inner.get_next_level_protocol() != IpNextHeaderProtocols::Udp
    {
        return None;
    }
    // Routers may truncate the quote, so slice the UDP header manually
    // instead of trusting the quoted total length.
    let header_len = usize::from(inner.get_header_length()) * 4;
    let udp = inner_bytes.get(header_len..header_len + UDP_HEADER_LEN_BYTES)?;

    Some(Candidate {
        kind,
        src_port: u16::from_be_bytes([udp[0], udp[1]]),
        dst_port: u16::from_be_bytes([udp[2], udp[3]]),
        checksum: u16::from_be_bytes([udp[6], udp[7]]),
        identifier: inner.get_identification(),
    })
}

/// Decode an IPv6 capture (an ICMPv6 message, header already stripped by
/// the kernel) into a match candidate.
fn decode_v6(target: Ipv6Addr, packet: &CapturedPacket) -> Option<Candidate> {
    let icmp = Icmpv6Packet::new(&packet.bytes)?;
    let kind = match icmp.get_icmpv6_type() {
        Icmpv6Types::TimeExceeded => ResponseKind::TimeExceeded,
        Icmpv6Types::DestinationUnreachable => {
            let code = icmp.get_icmpv6_code().0;
            if code == ICMP_V6_PORT_UNREACHABLE {
                ResponseKind::UdpPortUnreachable
            } else {
                ResponseKind::DestinationUnreachable(code)
            }
        }
        _ => return None,
    };

    if packet.bytes.len()
        < ICMP_ERROR_HEADER_LEN_BYTES + IPV6_HEADER_LEN_BYTES + UDP_HEADER_LEN_BYTES + 2
    {
        return None;
    }
    let inner_bytes = &packet.bytes[ICMP_ERROR_HEADER_LEN_BYTES..];
    let inner = Ipv6Packet::new(inner_bytes)?;
    if inner.get_destination() != target || inner.get_next_header() != IpNextHeaderProtocols::Udp
    {
        return None;
    }
    let udp = inner_bytes.get(IPV6_HEADER_LEN_BYTES..)?;
    // The (path index, TTL) pair rides in the first two payload bytes.
    let identifier = u16::from_be_bytes([
        *udp.get(UDP_HEADER_LEN_BYTES)?,
        *udp.get(UDP_HEADER_LEN_BYTES + 1)?,
    ]);

    Some(Candidate {
        kind,
        src_port: u16::from_be_bytes([udp[0], udp[1]]),
        dst_port: u16::from_be_bytes([udp[2], udp[3]]),
        checksum: u16::from_be_bytes([udp[6], udp[7]]),
        identifier,
    })
}

/// Resolve a candidate to a (path index, TTL) pair, NAT-resiliently.
fn match_probe(config: &TracerouteConfig, candidate: &Candidate) -> Option<ProbeMatch> {
    let npaths = u16::from(config.npaths);
    let base = config.dst_port;
    // Validation guarantees base + npaths - 1 fits in a u16.
    let span = npaths - 1;
    let ttl_range = config.min_ttl..=config.max_ttl;
    let valid =
        |path: u8, ttl: u8| u16::from(path) < npaths && ttl_range.contains(&ttl);

    // Which path do the quoted ports claim, if they are unrewritten?
    let port_path: Option<u8> = if config.broken_nat {
        (candidate.dst_port == base
            && (config.src_port..=config.src_port + span).contains(&candidate.src_port))
            .then(|| (candidate.src_port - config.src_port) as u8)
    } else {
        (candidate.src_port == config.src_port
            && (base..=base + span).contains(&candidate.dst_port))
            .then(|| (candidate.dst_port - base) as u8)
    };

    let id_path = (candidate.identifier >> 8) as u8;
    let id_ttl = (candidate.identifier & 0xff) as u8;

    // 1. Exact match: ports and identifier agree.
    if let Some(path) = port_path {
        if path == id_path && valid(path, id_ttl) {
            return Some(ProbeMatch {
                path_index: path,
                ttl: id_ttl,
                nat_detected: false,
            });
        }
    }

    // 2. Identifier fallback: ports were rewritten but the NAT-invariant
    //    copy survived.
    if valid(id_path, id_ttl) {
        return Some(ProbeMatch {
            path_index: id_path,
            ttl: id_ttl,
            nat_detected: port_path != Some(id_path),
        });
    }

    // 3. Checksum fallback: the forced UDP checksum still names the path.
    if (base..=base + span).contains(&candidate.checksum) {
        let path = (candidate.checksum - base) as u8;
        if valid(path, id_ttl) {
            return Some(ProbeMatch {
                path_index: path,
                ttl: id_ttl,
                nat_detected: true,
            });
        }
    }

    None
}
