//! High-level convenience API

use crate::traceroute::{
    MultipathTracer, TracerouteConfig, TracerouteError, TracerouteResults,
};

/// Run a multipath traceroute to `target` with default settings.
///
/// Equivalent to building a default [`TracerouteConfig`] for the target
/// and calling [`trace_with_config`].
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), mptrace::TracerouteError> {
/// let results = mptrace::trace("example.com").await?;
/// println!("{} flows probed", results.flow_count());
/// # Ok(())
/// # }
/// ```
pub async fn trace(target: &str) -> Result<TracerouteResults, TracerouteError> {
    let config = TracerouteConfig::builder().target(target).build()?;
    trace_with_config(config).await
}

/// Run a multipath traceroute with an explicit configuration.
pub async fn trace_with_config(
    config: TracerouteConfig,
) -> Result<TracerouteResults, TracerouteError> {
    MultipathTracer::new(config)?.run().await
}
