//! The periodic collection loop.
//!
//! On every tick the sampler reads each metric from its [`MetricSource`],
//! converts the raw value to the stored unit and appends one sample per
//! metric to the [`MetricRegistry`]. Reads run concurrently on the blocking
//! pool, each under a deadline; a failed or late read becomes a sentinel
//! sample for that metric only. A read that outlives its deadline keeps its
//! blocking thread, so the sampler holds on to it and does not start another
//! read of that metric until it has returned.
//!
//! ## Counter semantics
//!
//! CPU, memory and GPU are stored as instantaneous percentages. Disk and
//! network come from cumulative OS counters and are stored according to
//! [`CounterMode`]:
//!
//! - `Rate`: megabytes per second since the previous successful reading. The
//!   first successful reading only sets the baseline and stores nothing. A
//!   counter that went backwards is re-based and stores `0`.
//! - `Cumulative`: the running total in megabytes.
//!
//! Rates divide by the configured interval, not the measured time between
//! readings. A tick delayed by slow reads therefore overstates the rate for
//! that tick.

use crate::config::{CounterMode, SamplerConfig};
use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use crate::registry::MetricRegistry;
use crate::series::Sample;
use crate::source::MetricSource;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Metrics that received a measured sample.
    pub measured: Vec<Metric>,
    /// Metrics that received a sentinel.
    pub unavailable: Vec<Metric>,
    /// Counters whose reading only established a rate baseline.
    pub baselined: Vec<Metric>,
    pub duration: Duration,
}

/// Rate state for one cumulative counter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CounterState {
    /// Last successful reading, already converted to megabytes.
    last: Option<f64>,
    /// Failed ticks since `last` was read.
    missed: u32,
}

impl CounterState {
    /// Folds in a new total and returns the rate, or `None` for the first
    /// reading.
    fn advance(&mut self, total: f64, interval: Duration) -> Option<f64> {
        let previous = self.last.replace(total);
        let ticks = f64::from(self.missed + 1);
        self.missed = 0;
        let previous = previous?;
        let delta = total - previous;
        if delta < 0.0 {
            debug!(previous, total, "counter went backwards, re-basing");
            return Some(0.0);
        }
        Some(delta / (ticks * interval.as_secs_f64()))
    }

    fn miss(&mut self) {
        if self.last.is_some() {
            self.missed = self.missed.saturating_add(1);
        }
    }
}

/// The single writer of the metric registry.
pub struct Sampler {
    registry: Arc<MetricRegistry>,
    source: Arc<dyn MetricSource>,
    interval: Duration,
    read_timeout: Duration,
    counter_mode: CounterMode,
    counters: HashMap<Metric, CounterState>,
    /// Metrics whose last reading failed, to log state changes once.
    failing: HashSet<Metric>,
    /// Reads that timed out and may still hold a blocking thread.
    in_flight: HashMap<Metric, JoinHandle<Result<f64>>>,
}

impl Sampler {
    /// Creates a sampler writing into `registry`.
    pub fn new(
        registry: Arc<MetricRegistry>,
        source: Arc<dyn MetricSource>,
        config: &SamplerConfig,
    ) -> Self {
        Self {
            registry,
            source,
            interval: config.interval(),
            read_timeout: config.read_timeout(),
            counter_mode: config.counter_mode,
            counters: HashMap::new(),
            failing: HashSet::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn counter_mode(&self) -> CounterMode {
        self.counter_mode
    }

    /// Runs ticks on the configured interval until the shutdown signal
    /// changes or its sender is dropped.
    ///
    /// A tick still in flight when the signal arrives is abandoned before any
    /// of its samples are appended, so every series is left at its pre-tick
    /// version.
    #[instrument(skip_all, fields(source = self.source.name()))]
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            read_timeout_ms = self.read_timeout.as_millis() as u64,
            counter_mode = %self.counter_mode,
            "Sampler started."
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Sampler received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Sampler received shutdown signal mid-tick, abandoning tick.");
                    break;
                }
                report = self.tick() => {
                    trace!(?report, "tick complete");
                }
            }
        }
        info!("Sampler finished.");
    }

    /// Reads every metric once and appends the results.
    ///
    /// All reads finish (or time out) before the first append, so dropping
    /// this future part-way never leaves a partially updated tick behind.
    /// A metric whose previous read is still running is not read again; it
    /// gets a sentinel for this tick.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let reads = Metric::ALL.map(|metric| {
            let previous = self.in_flight.remove(&metric);
            let source = self.source.clone();
            let timeout = self.read_timeout;
            async move {
                match previous {
                    Some(handle) if !handle.is_finished() => {
                        let busy = MonitorError::unavailable(metric, "previous read still in progress");
                        (metric, Err(busy), Some(handle))
                    }
                    _ => {
                        let (reading, pending) = read_with_deadline(source, metric, timeout).await;
                        (metric, reading, pending)
                    }
                }
            }
        });
        let readings = join_all(reads).await;

        let mut report = TickReport::default();
        for (metric, reading, pending) in readings {
            if let Some(handle) = pending {
                self.in_flight.insert(metric, handle);
            }
            self.record(metric, reading, &mut report);
        }
        report.duration = started.elapsed();

        metrics::counter!("sampler_ticks_total").increment(1);
        metrics::histogram!("sampler_tick_duration_seconds").record(report.duration.as_secs_f64());
        report
    }

    fn record(&mut self, metric: Metric, reading: Result<f64>, report: &mut TickReport) {
        let reading = reading.and_then(|raw| validate(metric, raw));
        match reading {
            Ok(raw) => {
                if self.failing.remove(&metric) {
                    info!(metric = %metric, "Metric has RECOVERED.");
                }
                let value = metric.descriptor().convert(raw);
                let stored = if metric.is_counter() && self.counter_mode == CounterMode::Rate {
                    self.counters
                        .entry(metric)
                        .or_default()
                        .advance(value, self.interval)
                } else {
                    Some(value)
                };
                match stored {
                    Some(value) => {
                        self.registry.append(metric, Sample::measured(value));
                        report.measured.push(metric);
                    }
                    None => {
                        debug!(metric = %metric, total = value, "Rate baseline established.");
                        report.baselined.push(metric);
                    }
                }
            }
            Err(e) => {
                if self.failing.insert(metric) {
                    warn!(metric = %metric, error = %e, "Metric unavailable, storing sentinel.");
                } else {
                    debug!(metric = %metric, error = %e, "Metric remains unavailable.");
                }
                metrics::counter!("metric_unavailable_total", "metric" => metric.key()).increment(1);
                if let Some(state) = self.counters.get_mut(&metric) {
                    state.miss();
                }
                self.registry.append(metric, Sample::sentinel());
                report.unavailable.push(metric);
            }
        }
    }
}

/// Rejects readings outside the source contract: negative, non-finite, or
/// above the metric's raw maximum.
fn validate(metric: Metric, raw: f64) -> Result<f64> {
    if metric.descriptor().accepts(raw) {
        Ok(raw)
    } else {
        Err(MonitorError::unavailable(
            metric,
            format!("source returned out-of-range value {}", raw),
        ))
    }
}

/// Runs one blocking source read on the blocking pool with a deadline.
///
/// On timeout the blocking call keeps running in the background; its handle
/// is returned alongside the error and its eventual result is discarded.
async fn read_with_deadline(
    source: Arc<dyn MetricSource>,
    metric: Metric,
    timeout: Duration,
) -> (Result<f64>, Option<JoinHandle<Result<f64>>>) {
    let mut task = tokio::task::spawn_blocking(move || source.read(metric));
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => (result, None),
        Ok(Err(join_error)) => (
            Err(MonitorError::unavailable(
                metric,
                format!("source read panicked: {}", join_error),
            )),
            None,
        ),
        Err(_) => (Err(MonitorError::ReadTimeout { metric, timeout }), Some(task)),
    }
}
