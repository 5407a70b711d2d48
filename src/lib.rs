//! mptrace - NAT-aware multipath traceroute
//!
//! This library discovers, for a destination host, the set of distinct
//! forwarding paths that Equal-Cost Multi-Path (ECMP) routing may select
//! between source and destination, and reconstructs each path's hop
//! sequence even when a NAT middlebox rewrites the port fields that
//! standard multipath traceroute relies on.

use std::sync::atomic::{AtomicU8, Ordering};

pub mod dns;
pub mod net;
pub mod probe;
pub mod traceroute;

// Re-export core types for library users
pub use net::{CapturedPacket, PacketSource, ProbeSender, Sniffer};
pub use probe::{ProbeBuilder, ProbePacket, SentProbe};
pub use traceroute::{
    correlate_flows, trace, trace_with_config, Flow, Hop, MultipathTracer, ResponseKind,
    TracerouteConfig, TracerouteConfigBuilder, TracerouteError, TracerouteResults,
};

/// Global verbosity level for diagnostic output on stderr.
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// Set the global verbosity level (0 = quiet).
pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

/// Get the current global verbosity level.
#[must_use]
pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

/// Print a diagnostic message to stderr if the global verbosity is at
/// least `level`.
#[macro_export]
macro_rules! debug_print {
    ($level:expr, $($arg:tt)*) => {
        if $crate::verbosity() >= $level {
            eprintln!("[mptrace] {}", format_args!($($arg)*));
        }
    };
}
