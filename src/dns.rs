//! Forward and reverse DNS resolution

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;
use std::sync::Arc;

/// Error type for DNS operations
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    ResolutionError(String),

    /// The name resolved, but not to the requested address family
    #[error("{host} has no {family} address")]
    FamilyMismatch {
        /// The hostname or literal that was looked up
        host: String,
        /// Requested family ("IPv4" or "IPv6")
        family: &'static str,
    },

    /// No records of the requested type were found
    #[error("no address records found for {0}")]
    NoRecords(String),

    /// No PTR record found
    #[error("No PTR record found")]
    NotFound,
}

/// Resolve a target hostname or address literal to an IP address.
///
/// Literals are accepted directly, but only when they match the
/// requested family. Hostnames are resolved via A or AAAA lookup and
/// the first record wins.
pub async fn resolve_target(host: &str, want_ipv6: bool) -> Result<IpAddr, DnsError> {
    let family = if want_ipv6 { "IPv6" } else { "IPv4" };

    if let Ok(ip) = host.parse::<IpAddr>() {
        if ip.is_ipv6() == want_ipv6 {
            return Ok(ip);
        }
        return Err(DnsError::FamilyMismatch {
            host: host.to_string(),
            family,
        });
    }

    let resolver = create_default_resolver();
    if want_ipv6 {
        let lookup = resolver
            .ipv6_lookup(host)
            .await
            .map_err(|e| DnsError::ResolutionError(e.to_string()))?;
        lookup
            .iter()
            .next()
            .map(|aaaa| IpAddr::V6(aaaa.0))
            .ok_or_else(|| DnsError::NoRecords(host.to_string()))
    } else {
        let lookup = resolver
            .ipv4_lookup(host)
            .await
            .map_err(|e| DnsError::ResolutionError(e.to_string()))?;
        lookup
            .iter()
            .next()
            .map(|a| IpAddr::V4(a.0))
            .ok_or_else(|| DnsError::NoRecords(host.to_string()))
    }
}

/// Perform reverse DNS lookup for an IP address
pub async fn reverse_dns_lookup(
    ip: IpAddr,
    resolver: Option<Arc<TokioResolver>>,
) -> Result<String, DnsError> {
    let resolver = match resolver {
        Some(r) => r,
        None => Arc::new(create_default_resolver()),
    };

    let lookup = resolver
        .reverse_lookup(ip)
        .await
        .map_err(|e| DnsError::ResolutionError(e.to_string()))?;

    // Get the first PTR record, without the trailing dot
    let name = lookup
        .iter()
        .next()
        .map(|name| {
            let name_str = name.to_string();
            if name_str.ends_with('.') {
                name_str[..name_str.len() - 1].to_string()
            } else {
                name_str
            }
        })
        .ok_or(DnsError::NotFound)?;

    Ok(name)
}

/// Create a default DNS resolver
pub fn create_default_resolver() -> TokioResolver {
    TokioResolver::builder_with_config(
        ResolverConfig::cloudflare(),
        TokioConnectionProvider::default(),
    )
    .build()
}
