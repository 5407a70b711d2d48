//! Configuration types for multipath traceroute runs

use crate::traceroute::error::TracerouteError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one multipath traceroute run.
///
/// Immutable once built: construction goes through
/// [`TracerouteConfigBuilder`], which validates the parameter
/// combination. The resolved target address is deliberately not part of
/// the config; it belongs to the run that resolved it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerouteConfig {
    /// Target hostname or literal IP address
    pub target: String,
    /// Probe over IPv6 instead of IPv4
    pub ipv6: bool,
    /// UDP source port (default: 12345)
    pub src_port: u16,
    /// Base UDP destination port; path `i` probes port `base + i`
    /// (default: 33434)
    pub dst_port: u16,
    /// Number of ECMP paths to enumerate, 1-255 (default: 20)
    pub npaths: u8,
    /// Lowest TTL probed (default: 1)
    pub min_ttl: u8,
    /// Highest TTL probed (default: 30)
    pub max_ttl: u8,
    /// Pause between consecutive probe sends (default: 10ms)
    pub delay: Duration,
    /// Select paths by varying the source port instead of the
    /// destination port, for NATs that rewrite the destination
    /// (default: off)
    pub broken_nat: bool,
    /// How long to keep capturing after the last probe so in-flight
    /// responses still arrive (default: 1000ms)
    pub drain_timeout: Duration,
    /// Annotate responding hops with reverse DNS names (default: on)
    pub enable_rdns: bool,
    /// Verbosity for diagnostic output
    pub verbose: u8,
}

impl Default for TracerouteConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            ipv6: false,
            src_port: 12345,
            dst_port: 33434,
            npaths: 20,
            min_ttl: 1,
            max_ttl: 30,
            delay: Duration::from_millis(10),
            broken_nat: false,
            drain_timeout: Duration::from_millis(1000),
            enable_rdns: true,
            verbose: 0,
        }
    }
}

impl TracerouteConfig {
    /// Create a new TracerouteConfig builder
    pub fn builder() -> TracerouteConfigBuilder {
        TracerouteConfigBuilder::new()
    }

    /// The flow identifier for a path: the base destination port plus
    /// the path index. Also the value the probe's UDP checksum is
    /// forced to.
    pub fn flow_id(&self, path_index: u8) -> u16 {
        self.dst_port + u16::from(path_index)
    }

    /// Total number of probes one run sends.
    pub fn probe_count(&self) -> usize {
        usize::from(self.npaths) * (usize::from(self.max_ttl) - usize::from(self.min_ttl) + 1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.target.is_empty() {
            return Err("target must be specified".to_string());
        }
        if self.npaths < 1 {
            return Err("npaths must be at least 1".to_string());
        }
        if self.min_ttl < 1 {
            return Err("min_ttl must be at least 1".to_string());
        }
        if self.max_ttl < self.min_ttl {
            return Err("max_ttl must be greater than or equal to min_ttl".to_string());
        }
        let span = u16::from(self.npaths) - 1;
        if self.dst_port.checked_add(span).is_none() {
            return Err("dst_port + npaths exceeds the valid port range".to_string());
        }
        if self.broken_nat && self.src_port.checked_add(span).is_none() {
            return Err("src_port + npaths exceeds the valid port range".to_string());
        }
        Ok(())
    }
}

/// Builder for TracerouteConfig
pub struct TracerouteConfigBuilder {
    config: TracerouteConfig,
}

impl TracerouteConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: TracerouteConfig::default(),
        }
    }

    /// Set the target hostname or IP address
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target = target.into();
        self
    }

    /// Probe over IPv6 instead of IPv4
    pub fn ipv6(mut self, ipv6: bool) -> Self {
        self.config.ipv6 = ipv6;
        self
    }

    /// Set the UDP source port
    pub fn src_port(mut self, port: u16) -> Self {
        self.config.src_port = port;
        self
    }

    /// Set the base UDP destination port
    pub fn dst_port(mut self, port: u16) -> Self {
        self.config.dst_port = port;
        self
    }

    /// Set the number of ECMP paths to enumerate
    pub fn npaths(mut self, npaths: u8) -> Self {
        self.config.npaths = npaths;
        self
    }

    /// Set the lowest TTL probed
    pub fn min_ttl(mut self, ttl: u8) -> Self {
        self.config.min_ttl = ttl;
        self
    }

    /// Set the highest TTL probed
    pub fn max_ttl(mut self, ttl: u8) -> Self {
        self.config.max_ttl = ttl;
        self
    }

    /// Set the pause between consecutive probe sends
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Select paths by source port instead of destination port, for
    /// NATs that rewrite the destination
    pub fn broken_nat(mut self, broken_nat: bool) -> Self {
        self.config.broken_nat = broken_nat;
        self
    }

    /// Set how long capture continues after the last probe
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Enable or disable reverse DNS annotation of hops
    pub fn enable_rdns(mut self, enable: bool) -> Self {
        self.config.enable_rdns = enable;
        self
    }

    /// Set the verbosity level
    pub fn verbose(mut self, verbose: u8) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Build the configuration, validating the parameter combination
    pub fn build(self) -> Result<TracerouteConfig, TracerouteError> {
        self.config
            .validate()
            .map_err(TracerouteError::ConfigError)?;
        Ok(self.config)
    }
}

impl Default for TracerouteConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracerouteConfig::default();
        assert_eq!(config.src_port, 12345);
        assert_eq!(config.dst_port, 33434);
        assert_eq!(config.npaths, 20);
        assert_eq!(config.min_ttl, 1);
        assert_eq!(config.max_ttl, 30);
        assert_eq!(config.delay.as_millis(), 10);
        assert!(!config.broken_nat);
        assert!(!config.ipv6);
        assert!(config.enable_rdns);
    }

    #[test]
    fn test_config_builder() {
        let config = TracerouteConfig::builder()
            .target("example.com")
            .npaths(4)
            .min_ttl(2)
            .max_ttl(12)
            .delay(Duration::from_millis(0))
            .broken_nat(true)
            .build()
            .unwrap();

        assert_eq!(config.target, "example.com");
        assert_eq!(config.npaths, 4);
        assert_eq!(config.min_ttl, 2);
        assert_eq!(config.max_ttl, 12);
        assert!(config.broken_nat);
        assert_eq!(config.probe_count(), 4 * 11);
    }

    #[test]
    fn test_config_validation() {
        // Empty target
        assert!(TracerouteConfig::builder().build().is_err());

        // min_ttl > max_ttl
        let result = TracerouteConfig::builder()
            .target("example.com")
            .min_ttl(5)
            .max_ttl(1)
            .build();
        assert!(matches!(result, Err(TracerouteError::ConfigError(_))));

        // Zero paths
        let result = TracerouteConfig::builder()
            .target("example.com")
            .npaths(0)
            .build();
        assert!(matches!(result, Err(TracerouteError::ConfigError(_))));

        // Zero min_ttl
        let result = TracerouteConfig::builder()
            .target("example.com")
            .min_ttl(0)
            .build();
        assert!(result.is_err());

        // Degenerate but valid: a single probe
        let result = TracerouteConfig::builder()
            .target("example.com")
            .min_ttl(1)
            .max_ttl(1)
            .npaths(1)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_port_range_overflow() {
        let result = TracerouteConfig::builder()
            .target("example.com")
            .dst_port(u16::MAX - 3)
            .npaths(10)
            .build();
        assert!(result.is_err());

        let result = TracerouteConfig::builder()
            .target("example.com")
            .src_port(u16::MAX - 3)
            .npaths(10)
            .broken_nat(true)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_flow_id() {
        let config = TracerouteConfig::builder()
            .target("example.com")
            .build()
            .unwrap();
        assert_eq!(config.flow_id(0), 33434);
        assert_eq!(config.flow_id(19), 33453);
    }
}
