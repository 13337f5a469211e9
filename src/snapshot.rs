//! Read side of the registry.
//!
//! Snapshots are owned copies: a renderer can hold one for as long as drawing
//! takes without affecting the sampler.

use crate::error::Result;
use crate::metric::Metric;
use crate::registry::MetricRegistry;
use crate::series::{RingSeries, Sample};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An owned copy of one metric's history, oldest sample first.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub metric: Metric,
    pub capacity: usize,
    pub samples: Vec<Sample>,
}

impl SeriesSnapshot {
    pub(crate) fn from_series(metric: Metric, series: &RingSeries) -> Self {
        Self {
            metric,
            capacity: series.capacity(),
            samples: series.snapshot(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Capture-time labels (`HH:MM:SS`), aligned with [`values`](Self::values).
    pub fn labels(&self) -> Vec<String> {
        self.samples.iter().map(Sample::label).collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest value in the window, or `None` when empty.
    pub fn max(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.value).reduce(f64::max)
    }
}

/// Snapshots of every tracked metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    series: BTreeMap<Metric, SeriesSnapshot>,
}

impl RegistrySnapshot {
    pub fn get(&self, metric: Metric) -> Option<&SeriesSnapshot> {
        self.series.get(&metric)
    }

    /// Looks a series up by metric key.
    pub fn by_name(&self, name: &str) -> Result<Option<&SeriesSnapshot>> {
        let metric: Metric = name.parse()?;
        Ok(self.get(metric))
    }

    /// Iterates in metric display order.
    pub fn iter(&self) -> impl Iterator<Item = &SeriesSnapshot> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Metric key to values, the shape chart renderers consume.
    pub fn as_map(&self) -> BTreeMap<&'static str, Vec<f64>> {
        self.series
            .iter()
            .map(|(metric, series)| (metric.key(), series.values()))
            .collect()
    }
}

impl FromIterator<SeriesSnapshot> for RegistrySnapshot {
    fn from_iter<I: IntoIterator<Item = SeriesSnapshot>>(iter: I) -> Self {
        Self {
            series: iter.into_iter().map(|s| (s.metric, s)).collect(),
        }
    }
}

/// Cloneable read handle over a shared registry.
///
/// All methods are safe to call from any number of threads while the
/// sampler is appending.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    registry: Arc<MetricRegistry>,
}

impl SnapshotReader {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// Returns an owned copy of every series.
    pub fn read_all(&self) -> RegistrySnapshot {
        self.registry.snapshot_all()
    }

    /// Returns an owned copy of one series.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMetric` if `name` is not a tracked metric key.
    pub fn read_one(&self, name: &str) -> Result<SeriesSnapshot> {
        let metric: Metric = name.parse()?;
        Ok(self.read_metric(metric))
    }

    pub fn read_metric(&self, metric: Metric) -> SeriesSnapshot {
        self.registry.snapshot(metric)
    }
}
