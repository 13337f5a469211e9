//! # Internal Metrics Module
//!
//! The sampler reports on itself through the `metrics` facade. Nothing is
//! recorded unless a recorder is installed; the only recorder shipped here is
//! [`LoggingRecorder`], which writes a periodic summary to the log.
//!
//! | name                            | kind      | labels   |
//! |---------------------------------|-----------|----------|
//! | `sampler_ticks_total`           | counter   |          |
//! | `metric_unavailable_total`      | counter   | `metric` |
//! | `sampler_tick_duration_seconds` | histogram |          |

use crate::config::MetricsConfig;
use crate::task_manager::TaskManager;
use metrics::Unit;
use std::time::Duration;
use tracing::{info, warn};

pub mod logging_recorder;

pub use logging_recorder::LoggingRecorder;

/// Registers descriptions for every self-metric with the global recorder.
pub fn describe() {
    metrics::describe_counter!("sampler_ticks_total", Unit::Count, "Total number of completed sampler ticks.");
    metrics::describe_counter!("metric_unavailable_total", Unit::Count, "Number of sentinel samples stored, labeled by metric.");
    metrics::describe_histogram!("sampler_tick_duration_seconds", Unit::Seconds, "Time taken to read and record every metric in one tick.");
}

/// Installs a [`LoggingRecorder`] as the global recorder and spawns its
/// reporting task, if enabled in the configuration.
///
/// Only one global recorder can exist per process. If one is already
/// installed the existing recorder is kept and `false` is returned.
pub fn install_logging_recorder(config: &MetricsConfig, task_manager: &TaskManager) -> bool {
    if !config.log_metrics {
        return false;
    }

    let recorder = LoggingRecorder::new();
    let reporter = recorder.reporter(
        Duration::from_secs(config.log_aggregation_seconds),
        task_manager.get_shutdown_rx(),
    );
    if let Err(e) = metrics::set_global_recorder(recorder) {
        warn!(error = %e, "Failed to install logging recorder, keeping the existing one.");
        return false;
    }
    describe();
    info!(
        "Logging recorder enabled. Metrics will be printed every {} seconds.",
        config.log_aggregation_seconds
    );
    task_manager.spawn("LoggingRecorder", reporter);
    true
}
