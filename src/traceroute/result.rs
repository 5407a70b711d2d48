//! Result types for multipath traceroute operations

use crate::traceroute::types::{Flow, Hop};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Result of one multipath traceroute run.
///
/// Covers all configured paths: a path that received zero responses is
/// present as a flow of silent hops, never missing from the map.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let results = mptrace::trace("example.com").await?;
///
/// for flow in results.flows.values() {
///     println!("path {} saw {} hops", flow.path_index, flow.responding_hops());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteResults {
    /// Target hostname as provided
    pub target: String,
    /// Resolved target IP address
    pub target_ip: IpAddr,
    /// One flow per configured path index
    pub flows: BTreeMap<u8, Flow>,
    /// Whether any flow reached the destination
    pub destination_reached: bool,
    /// Total duration of the run
    pub total_duration: std::time::Duration,
}

impl TracerouteResults {
    /// Number of enumerated paths.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// The flow for a path index, if configured.
    pub fn flow(&self, path_index: u8) -> Option<&Flow> {
        self.flows.get(&path_index)
    }

    /// The hop at which a flow reached the destination, if it did.
    pub fn destination_hop(&self, path_index: u8) -> Option<&Hop> {
        self.flows
            .get(&path_index)?
            .hops
            .iter()
            .find(|hop| hop.is_destination(self.target_ip))
    }

    /// Check if a specific (path, TTL) pair received a response.
    pub fn has_response_at(&self, path_index: u8, ttl: u8) -> bool {
        self.flows
            .get(&path_index)
            .and_then(|flow| flow.hop_at(ttl))
            .is_some_and(|hop| hop.addr.is_some())
    }

    /// True if any hop only matched through the NAT fallback, i.e. a
    /// middlebox rewrote probe ports somewhere along a path.
    pub fn nat_detected(&self) -> bool {
        self.flows
            .values()
            .any(|flow| flow.hops.iter().any(|hop| hop.nat_detected))
    }

    /// Mean round-trip time in milliseconds over all responding hops.
    pub fn average_rtt_ms(&self) -> Option<f64> {
        let rtts: Vec<f64> = self
            .flows
            .values()
            .flat_map(|flow| flow.hops.iter())
            .filter_map(Hop::rtt_ms)
            .collect();

        if rtts.is_empty() {
            None
        } else {
            Some(rtts.iter().sum::<f64>() / rtts.len() as f64)
        }
    }
}
