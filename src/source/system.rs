//! # System Metric Source
//!
//! This module defines the `SystemSource`, the production [`MetricSource`]
//! backed by the `sysinfo` crate for CPU, memory, disk and network readings
//! and by [`GpuProbe`] for GPU load.
//!
//! Disk I/O totals are the sum of every visible process's cumulative read and
//! write bytes, which is what `sysinfo` exposes portably. Processes that exit
//! take their bytes with them, so the total can shrink between readings; the
//! sampler treats a shrinking counter as a reset.

use super::{GpuProbe, MetricSource};
use crate::config::GpuConfig;
use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use sysinfo::{Networks, System};
use tracing::trace;

/// Reads of two counters from the same table within this window share one
/// refresh, so `disk_read` and `disk_write` in one tick cost a single scan.
const REFRESH_COALESCE_WINDOW: Duration = Duration::from_millis(200);

struct Cached<T> {
    inner: T,
    refreshed_at: Option<Instant>,
}

impl<T> Cached<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            refreshed_at: None,
        }
    }

    /// Runs `refresh` unless the value was refreshed within the coalescing
    /// window.
    fn refresh_with(&mut self, refresh: impl FnOnce(&mut T)) -> &T {
        let stale = self
            .refreshed_at
            .map_or(true, |at| at.elapsed() >= REFRESH_COALESCE_WINDOW);
        if stale {
            refresh(&mut self.inner);
            self.refreshed_at = Some(Instant::now());
        }
        &self.inner
    }
}

/// `sysinfo`-backed metric source.
///
/// Each kind of reading has its own lock so that a slow process scan does
/// not hold up the CPU or network readings of the same tick.
pub struct SystemSource {
    host: Mutex<System>,
    processes: Mutex<Cached<System>>,
    networks: Mutex<Cached<Networks>>,
    gpu: GpuProbe,
}

impl SystemSource {
    /// Creates a new `SystemSource`.
    ///
    /// CPU usage is a difference between two refreshes, so an initial refresh
    /// is taken here and the first tick already reports a real value.
    pub fn new(gpu_config: &GpuConfig) -> Self {
        let mut host = System::new();
        host.refresh_cpu();
        host.refresh_memory();
        Self {
            host: Mutex::new(host),
            processes: Mutex::new(Cached::new(System::new())),
            networks: Mutex::new(Cached::new(Networks::new_with_refreshed_list())),
            gpu: GpuProbe::detect(gpu_config),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>, metric: Metric) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| MonitorError::unavailable(metric, "source state poisoned by an earlier panic"))
    }

    fn cpu_percent(&self) -> Result<f64> {
        let mut host = Self::lock(&self.host, Metric::Cpu)?;
        host.refresh_cpu();
        Ok(f64::from(host.global_cpu_info().cpu_usage()))
    }

    fn memory_percent(&self) -> Result<f64> {
        let mut host = Self::lock(&self.host, Metric::Memory)?;
        host.refresh_memory();
        let total = host.total_memory();
        if total == 0 {
            return Err(MonitorError::unavailable(Metric::Memory, "total memory reported as 0"));
        }
        Ok(host.used_memory() as f64 / total as f64 * 100.0)
    }

    fn disk_bytes(&self, metric: Metric) -> Result<f64> {
        let mut processes = Self::lock(&self.processes, metric)?;
        let system = processes.refresh_with(|sys| {
            sys.refresh_processes();
        });
        let total: u64 = system
            .processes()
            .values()
            .map(|p| {
                let usage = p.disk_usage();
                if metric == Metric::DiskRead {
                    usage.total_read_bytes
                } else {
                    usage.total_written_bytes
                }
            })
            .sum();
        Ok(total as f64)
    }

    fn network_bytes(&self, metric: Metric) -> Result<f64> {
        let mut networks = Self::lock(&self.networks, metric)?;
        let networks = networks.refresh_with(|n| n.refresh_list());
        if networks.iter().next().is_none() {
            return Err(MonitorError::unavailable(metric, "no network interfaces"));
        }
        let total: u64 = networks
            .iter()
            .map(|(_, data)| {
                if metric == Metric::NetSent {
                    data.total_transmitted()
                } else {
                    data.total_received()
                }
            })
            .sum();
        Ok(total as f64)
    }
}

impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn read(&self, metric: Metric) -> Result<f64> {
        let value = match metric {
            Metric::Cpu => self.cpu_percent(),
            Metric::Memory => self.memory_percent(),
            Metric::DiskRead | Metric::DiskWrite => self.disk_bytes(metric),
            Metric::NetSent | Metric::NetRecv => self.network_bytes(metric),
            Metric::Gpu => self.gpu.load_fraction(),
        }?;
        trace!(metric = %metric, raw = value, "read metric");
        Ok(value)
    }
}
