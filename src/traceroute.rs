//! Core multipath traceroute functionality

pub mod api;
pub mod config;
pub mod correlate;
pub mod engine;
pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use api::{trace, trace_with_config};
pub use config::{TracerouteConfig, TracerouteConfigBuilder};
pub use correlate::correlate_flows;
pub use engine::MultipathTracer;
pub use error::TracerouteError;
pub use result::TracerouteResults;
pub use types::{Flow, Hop, ResponseKind};
