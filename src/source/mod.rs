//! Metric sources: the synchronous "read current value" side of sampling.

pub mod gpu;
pub mod system;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::error::Result;
use crate::metric::Metric;

pub use gpu::GpuProbe;
pub use system::SystemSource;

/// Reads the current raw value of a metric.
///
/// Raw units are fixed per metric: CPU and memory in percent `[0, 100]`,
/// disk and network as cumulative byte counters, GPU load as a fraction in
/// `[0, 1]`. Unit conversion is the sampler's job.
///
/// Calls are synchronous and may block; the sampler runs them on the
/// blocking pool under a deadline, so implementations must be `Send + Sync`
/// and tolerate concurrent calls for different metrics.
pub trait MetricSource: Send + Sync {
    /// A unique, descriptive name for the source, used in logs.
    fn name(&self) -> &str;

    /// Reads one metric.
    ///
    /// # Returns
    /// * `Ok(value)` with the raw reading
    /// * `Err(MonitorError::MetricUnavailable)` when the reading failed or
    ///   the resource does not exist on this machine
    fn read(&self, metric: Metric) -> Result<f64>;
}
