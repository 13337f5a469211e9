//! Shared per-metric history.
//!
//! The registry holds one published [`RingSeries`] per [`Metric`]. Each series
//! sits behind an [`ArcSwap`]: the sampler builds the next version of a
//! series (copy, append) and swaps it in atomically, while readers load the
//! current `Arc` without taking a lock. A reader therefore sees either the
//! version before an append or the version after it, never a buffer in the
//! middle of one, and reader activity never delays the sampler.

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::metric::Metric;
use crate::series::{RingSeries, Sample};
use crate::snapshot::{RegistrySnapshot, SeriesSnapshot};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::trace;

/// Owner of all metric series for the process lifetime.
pub struct MetricRegistry {
    cells: [ArcSwap<RingSeries>; Metric::ALL.len()],
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for metric in Metric::ALL {
            map.entry(&metric.key(), &self.series(metric).len());
        }
        map.finish()
    }
}

impl MetricRegistry {
    /// Creates a registry with one series per metric.
    ///
    /// `capacity` gives the history length for each metric and `prefill` the
    /// number of zero samples each series starts with.
    pub fn new(capacity: impl Fn(Metric) -> usize, prefill: usize) -> Self {
        Self {
            cells: Metric::ALL
                .map(|metric| ArcSwap::from_pointee(RingSeries::prefilled(capacity(metric), prefill))),
        }
    }

    /// Creates a registry sized from the history configuration.
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(|metric| config.length_for(metric), config.prefill)
    }

    /// Creates a registry where every metric shares one capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(|_| capacity, 0)
    }

    fn cell(&self, metric: Metric) -> &ArcSwap<RingSeries> {
        // `Metric::ALL` lists the variants in declaration order.
        &self.cells[metric as usize]
    }

    /// Returns the currently published series for a metric.
    pub fn series(&self, metric: Metric) -> Arc<RingSeries> {
        self.cell(metric).load_full()
    }

    /// Returns the currently published series for a metric name.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::UnknownMetric`](crate::MonitorError::UnknownMetric)
    /// when `name` is not one of the fixed metric keys. The key set is fixed,
    /// so this indicates a caller bug rather than a runtime condition.
    pub fn get(&self, name: &str) -> Result<Arc<RingSeries>> {
        let metric: Metric = name.parse()?;
        Ok(self.series(metric))
    }

    /// Appends one sample to a metric's series.
    ///
    /// Only the sampler calls this; it is the single writer, so a plain
    /// load-modify-store cannot lose an update.
    pub(crate) fn append(&self, metric: Metric, sample: Sample) {
        let cell = self.cell(metric);
        let mut next = RingSeries::clone(&cell.load());
        trace!(metric = %metric, value = sample.value, "appending sample");
        next.append(sample);
        cell.store(Arc::new(next));
    }

    /// Returns one series' snapshot.
    pub fn snapshot(&self, metric: Metric) -> SeriesSnapshot {
        SeriesSnapshot::from_series(metric, &self.series(metric))
    }

    /// Returns a snapshot of every metric.
    ///
    /// Each series is internally consistent. Different series may reflect
    /// slightly different moments within the same tick.
    pub fn snapshot_all(&self) -> RegistrySnapshot {
        Metric::ALL
            .into_iter()
            .map(|metric| self.snapshot(metric))
            .collect()
    }
}
