//! Error types for the sampling engine and process inspection.

use crate::metric::Metric;
use std::time::Duration;
use thiserror::Error;

/// Error type for monitoring operations.
///
/// Sampling errors (`MetricUnavailable`, `ReadTimeout`) never leave the
/// sampler loop; they are logged, counted and replaced by a sentinel sample.
/// Inspection errors are returned to the caller for display.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// A metric source call failed or the resource does not exist.
    #[error("metric '{metric}' is unavailable: {reason}")]
    MetricUnavailable { metric: Metric, reason: String },

    /// A metric source call did not return within its deadline.
    #[error("reading metric '{metric}' timed out after {timeout:?}")]
    ReadTimeout { metric: Metric, timeout: Duration },

    /// A metric name outside the fixed metric set was requested.
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    /// The requested process does not exist or is not accessible.
    #[error("process {0} not found")]
    ProcessNotFound(u32),

    /// The input could not be interpreted as a process id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    /// Shorthand for a `MetricUnavailable` error.
    pub fn unavailable(metric: Metric, reason: impl Into<String>) -> Self {
        Self::MetricUnavailable {
            metric,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors the sampler recovers from with a sentinel.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MetricUnavailable { .. } | Self::ReadTimeout { .. })
    }
}

/// Result type alias for monitoring operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
