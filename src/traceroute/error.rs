//! Error types for multipath traceroute operations

use thiserror::Error;

/// Errors that can occur during a multipath traceroute run.
///
/// The fatal variants (configuration, resolution and capture errors)
/// all surface before the first probe is sent. Individual probe send
/// failures are recovered locally and never appear here.
#[derive(Debug, Error)]
pub enum TracerouteError {
    /// Invalid parameter combination, rejected before any packet is sent
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The target could not be resolved to the requested address family
    #[error("Failed to resolve host: {0}")]
    ResolutionError(String),

    /// The capture socket could not be opened; the run never proceeds
    /// without a listener
    #[error("Failed to open capture: {0}")]
    CaptureError(String),

    /// Raw socket creation failed due to insufficient permissions
    #[error("Insufficient permissions: {required}")]
    InsufficientPermissions {
        /// Description of required permissions (e.g., "root or CAP_NET_RAW")
        required: String,
        /// Suggested remedy (e.g., "Run with sudo")
        suggestion: String,
    },

    /// Raw send socket creation failed for other reasons
    #[error("Failed to create socket: {0}")]
    SocketError(String),

    /// `run()` was called on an instance that is not idle
    #[error("A traceroute run is already active or finished on this instance")]
    AlreadyRan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TracerouteError::ConfigError("npaths must be at least 1".to_string());
        assert!(err.to_string().contains("Invalid configuration"));

        let err = TracerouteError::InsufficientPermissions {
            required: "root or CAP_NET_RAW capability".to_string(),
            suggestion: "Run with sudo".to_string(),
        };
        assert!(err.to_string().contains("CAP_NET_RAW"));
    }
}
