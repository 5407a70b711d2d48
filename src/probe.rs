//! Probe packet construction for multipath traceroute
//!
//! Each probe encodes the pair (path index, TTL) in fields that survive
//! both the ICMP error quoting performed by routers and the field
//! rewriting performed by NAT middleboxes. See [`builder::ProbeBuilder`]
//! for the exact encoding.

pub mod builder;
pub(crate) mod checksum;

pub use builder::ProbeBuilder;

use std::time::Instant;

/// A fully crafted probe datagram for one (path index, TTL) pair.
///
/// Construction is deterministic: identical inputs always produce
/// byte-identical packets, which is what makes exact-match correlation
/// possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePacket {
    /// Index of the ECMP path this probe selects, in `[0, npaths)`.
    pub path_index: u8,
    /// IP TTL / hop limit carried by the probe.
    pub ttl: u8,
    /// UDP source port on the wire.
    pub src_port: u16,
    /// UDP destination port on the wire.
    pub dst_port: u16,
    /// Flow identifier: the base destination port plus the path index.
    /// The UDP checksum is forced to this value so the identifier
    /// survives port rewriting.
    pub flow_id: u16,
    /// NAT-resilient copy of (path index, TTL): the high byte is the
    /// path index, the low byte the TTL. Carried in the IPv4
    /// identification field, or in the first two payload bytes for IPv6.
    pub identifier: u16,
    /// The complete IP datagram, starting at the IP header.
    pub bytes: Vec<u8>,
}

/// A probe that was handed to the send primitive during a run.
#[derive(Debug, Clone)]
pub struct SentProbe {
    /// The probe that was (or failed to be) transmitted.
    pub packet: ProbePacket,
    /// When the send was attempted; RTTs are measured from here.
    pub sent_at: Instant,
    /// False if the send primitive reported a failure. The pair then
    /// simply never matches a response.
    pub dispatched: bool,
}
