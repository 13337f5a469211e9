//! taskwatch - real-time local resource sampler
//!
//! A background [`Sampler`] reads CPU, memory, disk, network and GPU
//! utilisation on a fixed interval and keeps the most recent samples of each
//! in a bounded [`RingSeries`]. Readers take consistent snapshots through a
//! [`SnapshotReader`] without ever blocking the sampler. The
//! [`ProcessInspector`] answers on-demand process queries.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod internal_metrics;
pub mod metric;
pub mod process;
pub mod registry;
pub mod render;
pub mod sampler;
pub mod series;
pub mod snapshot;
pub mod source;
pub mod task_manager;

pub use error::{MonitorError, Result};
pub use metric::{Metric, MetricDescriptor, MetricKind};
pub use process::{ProcessDetails, ProcessInspector, ProcessRecord, SortKey};
pub use registry::MetricRegistry;
pub use sampler::{Sampler, TickReport};
pub use series::{RingSeries, Sample};
pub use snapshot::{RegistrySnapshot, SeriesSnapshot, SnapshotReader};
pub use source::{MetricSource, SystemSource};
