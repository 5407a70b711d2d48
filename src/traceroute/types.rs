//! Core data model: hops and flows

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Kind of response observed for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// ICMP Time Exceeded (TTL expired at an intermediate hop)
    TimeExceeded,
    /// ICMP Destination Unreachable with the given code
    DestinationUnreachable(u8),
    /// UDP port unreachable: the probe reached the destination itself
    UdpPortUnreachable,
    /// ICMP Echo Reply
    EchoReply,
}

/// One TTL step along one path.
///
/// A hop with no address is a silent hop: the probe went out but no
/// response was captured. That is a valid intermediate or terminal
/// state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    /// TTL the probe for this hop carried
    pub ttl: u8,
    /// Address of the responding router, if any
    pub addr: Option<IpAddr>,
    /// Reverse DNS name of the responder, best effort
    pub hostname: Option<String>,
    /// Round-trip delay between send and capture
    pub rtt: Option<Duration>,
    /// What kind of response was observed
    pub response: Option<ResponseKind>,
    /// True when the response only matched through the NAT-resilient
    /// fallback identifier, i.e. a middlebox rewrote the port fields
    pub nat_detected: bool,
}

impl Hop {
    /// An unanswered hop for the given TTL.
    pub fn empty(ttl: u8) -> Self {
        Self {
            ttl,
            addr: None,
            hostname: None,
            rtt: None,
            response: None,
            nat_detected: false,
        }
    }

    /// Check if this hop is the destination itself
    pub fn is_destination(&self, target: IpAddr) -> bool {
        self.addr == Some(target)
    }

    /// Get RTT in milliseconds
    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt.map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// The correlated hop sequence for one ECMP path.
///
/// Hops are ordered by TTL from `min_ttl` to `max_ttl`; that ordering is
/// authoritative and silent hops are explicit gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Index of this path, in `[0, npaths)`
    pub path_index: u8,
    /// The flow identifier probes for this path carried
    pub flow_id: u16,
    /// TTL-ordered hops, one per TTL in the probed range
    pub hops: Vec<Hop>,
}

impl Flow {
    /// A flow with only silent hops covering `[min_ttl, max_ttl]`.
    pub fn empty(path_index: u8, flow_id: u16, min_ttl: u8, max_ttl: u8) -> Self {
        let hops = (min_ttl..=max_ttl).map(Hop::empty).collect();
        Self {
            path_index,
            flow_id,
            hops,
        }
    }

    /// The hop probed with the given TTL, if within range.
    pub fn hop_at(&self, ttl: u8) -> Option<&Hop> {
        let first = self.hops.first()?.ttl;
        if ttl < first {
            return None;
        }
        self.hops.get(usize::from(ttl - first))
    }

    /// Mutable access to the hop probed with the given TTL.
    pub(crate) fn hop_at_mut(&mut self, ttl: u8) -> Option<&mut Hop> {
        let first = self.hops.first()?.ttl;
        if ttl < first {
            return None;
        }
        self.hops.get_mut(usize::from(ttl - first))
    }

    /// Number of hops that received a response.
    pub fn responding_hops(&self) -> usize {
        self.hops.iter().filter(|h| h.addr.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_empty_hop() {
        let hop = Hop::empty(7);
        assert_eq!(hop.ttl, 7);
        assert!(hop.addr.is_none());
        assert!(hop.rtt.is_none());
        assert!(!hop.nat_detected);
    }

    #[test]
    fn test_hop_destination_and_rtt() {
        let mut hop = Hop::empty(3);
        hop.addr = Some(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
        hop.rtt = Some(Duration::from_millis(25));

        assert!(hop.is_destination(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(!hop.is_destination(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))));
        assert_eq!(hop.rtt_ms(), Some(25.0));
    }

    #[test]
    fn test_empty_flow_covers_ttl_range() {
        let flow = Flow::empty(2, 33436, 3, 8);
        assert_eq!(flow.hops.len(), 6);
        assert_eq!(flow.hops[0].ttl, 3);
        assert_eq!(flow.hops[5].ttl, 8);
        assert_eq!(flow.responding_hops(), 0);
    }

    #[test]
    fn test_hop_at() {
        let mut flow = Flow::empty(0, 33434, 2, 5);
        flow.hop_at_mut(4).unwrap().addr = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        assert!(flow.hop_at(1).is_none());
        assert!(flow.hop_at(6).is_none());
        assert_eq!(flow.hop_at(2).unwrap().ttl, 2);
        assert!(flow.hop_at(4).unwrap().addr.is_some());
        assert_eq!(flow.responding_hops(), 1);
    }
}
