//! The fixed set of tracked metrics and their static descriptors.
//!
//! Every metric the sampler knows about is a variant of [`Metric`]. The
//! per-metric facts (display title, unit, how raw source values are
//! converted) live in a [`MetricDescriptor`] looked up by variant, so the set
//! of metrics is checked at compile time instead of being iterated as loose
//! tuples.

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BYTES_PER_MEGABYTE: f64 = 1e6;

/// A tracked metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    DiskRead,
    DiskWrite,
    NetSent,
    NetRecv,
    Gpu,
}

impl Metric {
    /// All metrics, in display order.
    pub const ALL: [Metric; 7] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::DiskRead,
        Metric::DiskWrite,
        Metric::NetSent,
        Metric::NetRecv,
        Metric::Gpu,
    ];

    /// The stable key used in configuration, snapshots and logs.
    pub fn key(self) -> &'static str {
        self.descriptor().key
    }

    /// Returns the static descriptor for this metric.
    pub fn descriptor(self) -> &'static MetricDescriptor {
        match self {
            Metric::Cpu => &CPU,
            Metric::Memory => &MEMORY,
            Metric::DiskRead => &DISK_READ,
            Metric::DiskWrite => &DISK_WRITE,
            Metric::NetSent => &NET_SENT,
            Metric::NetRecv => &NET_RECV,
            Metric::Gpu => &GPU,
        }
    }

    /// Returns `true` for metrics backed by a cumulative OS counter.
    pub fn is_counter(self) -> bool {
        self.descriptor().kind == MetricKind::Counter
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| MonitorError::UnknownMetric(s.to_string()))
    }
}

/// How a metric's raw reading should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// An instantaneous value in `[0, 100]`.
    Percentage,
    /// A monotonically growing OS counter.
    Counter,
}

/// Static description of one metric.
#[derive(Debug)]
pub struct MetricDescriptor {
    pub metric: Metric,
    pub key: &'static str,
    pub title: &'static str,
    /// Unit of the stored value for counters in cumulative mode and for
    /// percentages. Counters in rate mode are stored per second.
    pub unit: &'static str,
    pub kind: MetricKind,
    /// Largest raw reading a source may report, if bounded.
    pub raw_max: Option<f64>,
    /// Converts the raw source reading into the stored unit.
    pub convert: fn(f64) -> f64,
}

impl MetricDescriptor {
    /// Returns `true` if `raw` is a reading a source may report: finite,
    /// non-negative and within `raw_max`.
    pub fn accepts(&self, raw: f64) -> bool {
        raw.is_finite() && raw >= 0.0 && self.raw_max.map_or(true, |max| raw <= max)
    }

    /// Applies this metric's unit conversion to a raw reading.
    pub fn convert(&self, raw: f64) -> f64 {
        (self.convert)(raw)
    }
}

fn identity(raw: f64) -> f64 {
    raw
}

fn bytes_to_megabytes(raw: f64) -> f64 {
    raw / BYTES_PER_MEGABYTE
}

fn fraction_to_percent(raw: f64) -> f64 {
    raw * 100.0
}

static CPU: MetricDescriptor = MetricDescriptor {
    metric: Metric::Cpu,
    key: "cpu",
    title: "CPU Usage",
    unit: "%",
    kind: MetricKind::Percentage,
    raw_max: Some(100.0),
    convert: identity,
};

static MEMORY: MetricDescriptor = MetricDescriptor {
    metric: Metric::Memory,
    key: "memory",
    title: "Memory Usage",
    unit: "%",
    kind: MetricKind::Percentage,
    raw_max: Some(100.0),
    convert: identity,
};

static DISK_READ: MetricDescriptor = MetricDescriptor {
    metric: Metric::DiskRead,
    key: "disk_read",
    title: "Disk Read",
    unit: "MB",
    kind: MetricKind::Counter,
    raw_max: None,
    convert: bytes_to_megabytes,
};

static DISK_WRITE: MetricDescriptor = MetricDescriptor {
    metric: Metric::DiskWrite,
    key: "disk_write",
    title: "Disk Write",
    unit: "MB",
    kind: MetricKind::Counter,
    raw_max: None,
    convert: bytes_to_megabytes,
};

static NET_SENT: MetricDescriptor = MetricDescriptor {
    metric: Metric::NetSent,
    key: "net_sent",
    title: "Net Sent",
    unit: "MB",
    kind: MetricKind::Counter,
    raw_max: None,
    convert: bytes_to_megabytes,
};

static NET_RECV: MetricDescriptor = MetricDescriptor {
    metric: Metric::NetRecv,
    key: "net_recv",
    title: "Net Received",
    unit: "MB",
    kind: MetricKind::Counter,
    raw_max: None,
    convert: bytes_to_megabytes,
};

static GPU: MetricDescriptor = MetricDescriptor {
    metric: Metric::Gpu,
    key: "gpu",
    title: "GPU Usage",
    unit: "%",
    kind: MetricKind::Percentage,
    raw_max: Some(1.0),
    convert: fraction_to_percent,
};
