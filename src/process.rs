//! On-demand process listing and inspection.
//!
//! The inspector does not take part in the sampling loop and keeps no state
//! between calls: every call enumerates the process table afresh.

use crate::config::ProcessConfig;
use crate::error::{MonitorError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;
use sysinfo::{Pid, System};
use tracing::debug;

/// A process as seen at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    /// Share of one core; may exceed 100 on multi-core machines.
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// A [`ProcessRecord`] plus the fields only shown on inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetails {
    #[serde(flatten)]
    pub record: ProcessRecord,
    pub status: String,
    /// Not reported on every platform.
    pub thread_count: Option<usize>,
}

/// Sort order for process tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Cpu,
    Memory,
    Pid,
    Name,
}

impl SortKey {
    fn compare(self, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
        match self {
            SortKey::Cpu => b.cpu_percent.total_cmp(&a.cpu_percent),
            SortKey::Memory => b.memory_percent.total_cmp(&a.memory_percent),
            SortKey::Pid => a.pid.cmp(&b.pid),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        }
    }
}

/// Iterator over a snapshot of the process table.
///
/// The table is read once, when the iterator is created, and is not
/// refreshed while iterating. Records are built from that snapshot as the
/// iterator advances, in pid order.
pub struct ProcessList {
    system: System,
    pids: std::vec::IntoIter<Pid>,
}

impl Iterator for ProcessList {
    type Item = ProcessRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let system = &self.system;
        self.pids
            .find_map(|pid| system.process(pid).map(|process| record_for(system, pid, process)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pids.len()))
    }
}

fn memory_percent(system: &System, process: &sysinfo::Process) -> f64 {
    let total = system.total_memory();
    if total == 0 {
        return 0.0;
    }
    process.memory() as f64 / total as f64 * 100.0
}

fn record_for(system: &System, pid: Pid, process: &sysinfo::Process) -> ProcessRecord {
    ProcessRecord {
        pid: pid.as_u32(),
        name: process.name().to_string(),
        cpu_percent: f64::from(process.cpu_usage()),
        memory_percent: memory_percent(system, process),
    }
}

/// Queries live process attributes.
#[derive(Debug, Clone, Default)]
pub struct ProcessInspector {
    cpu_sample: Duration,
}

impl ProcessInspector {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            cpu_sample: Duration::from_millis(config.cpu_sample_ms),
        }
    }

    /// Loads the process table, taking a second refresh after the CPU sample
    /// window when one is configured.
    fn load(&self, refresh: impl Fn(&mut System)) -> System {
        let mut system = System::new();
        system.refresh_memory();
        refresh(&mut system);
        if !self.cpu_sample.is_zero() {
            std::thread::sleep(self.cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
            refresh(&mut system);
        }
        system
    }

    /// Enumerates running processes.
    ///
    /// Blocks for the CPU sample window. Processes that exit after the
    /// table was read still appear with their last known values; an empty
    /// listing is not an error.
    pub fn list_processes(&self) -> ProcessList {
        let system = self.load(|sys| {
            sys.refresh_processes();
        });
        let mut pids: Vec<Pid> = system.processes().keys().copied().collect();
        pids.sort_unstable();
        debug!(count = pids.len(), "enumerated processes");
        ProcessList {
            system,
            pids: pids.into_iter(),
        }
    }

    /// Lists processes sorted by `sort`, keeping at most `limit` rows.
    pub fn top(&self, sort: SortKey, limit: Option<usize>) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = self.list_processes().collect();
        records.sort_by(|a, b| sort.compare(a, b));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    /// Inspects a process given its pid as text.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `pid` is not a positive integer
    /// * `ProcessNotFound` if the process does not exist or is inaccessible
    pub fn inspect(&self, pid: &str) -> Result<ProcessDetails> {
        let pid = parse_pid(pid)?;
        self.inspect_pid(pid)
    }

    /// Inspects a process by numeric pid.
    pub fn inspect_pid(&self, pid: u32) -> Result<ProcessDetails> {
        let target = Pid::from_u32(pid);
        let system = self.load(|sys| sys.refresh_pids(&[target]));
        let process = system
            .process(target)
            .ok_or(MonitorError::ProcessNotFound(pid))?;
        Ok(ProcessDetails {
            record: record_for(&system, target, process),
            status: process.status().to_string(),
            thread_count: process.tasks().map(HashSet::len),
        })
    }
}

/// Parses user input into a pid.
pub fn parse_pid(input: &str) -> Result<u32> {
    let trimmed = input.trim();
    match trimmed.parse::<u32>() {
        Ok(0) => Err(MonitorError::InvalidArgument(
            "pid must be greater than 0".to_string(),
        )),
        Ok(pid) => Ok(pid),
        Err(_) => Err(MonitorError::InvalidArgument(format!(
            "'{}' is not a valid pid",
            trimmed
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> ProcessInspector {
        ProcessInspector::new(&ProcessConfig { cpu_sample_ms: 0 })
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid(" 42 ").unwrap(), 42);
        assert!(matches!(parse_pid("abc"), Err(MonitorError::InvalidArgument(_))));
        assert!(matches!(parse_pid("-3"), Err(MonitorError::InvalidArgument(_))));
        assert!(matches!(parse_pid("0"), Err(MonitorError::InvalidArgument(_))));
        assert!(matches!(parse_pid(""), Err(MonitorError::InvalidArgument(_))));
    }

    #[test]
    fn test_listing_includes_current_process() {
        let me = std::process::id();
        let found = quick().list_processes().find(|p| p.pid == me);
        let record = found.expect("current process should be listed");
        assert!(record.memory_percent >= 0.0);
    }

    #[test]
    fn test_listing_is_one_snapshot_in_pid_order() {
        let list = quick().list_processes();
        let (_, upper) = list.size_hint();
        let pids: Vec<u32> = list.map(|p| p.pid).collect();
        assert_eq!(Some(pids.len()), upper);
        assert!(pids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_inspect_current_process() {
        let details = quick().inspect(&std::process::id().to_string()).unwrap();
        assert_eq!(details.record.pid, std::process::id());
        assert!(!details.status.is_empty());
        #[cfg(target_os = "linux")]
        assert!(details.thread_count.unwrap() >= 1);
    }

    #[test]
    fn test_inspect_missing_pid() {
        // Above the largest pid Linux and macOS hand out.
        let err = quick().inspect("4000000000").unwrap_err();
        assert_eq!(err, MonitorError::ProcessNotFound(4_000_000_000));
    }

    #[test]
    fn test_sort_keys() {
        let a = ProcessRecord {
            pid: 2,
            name: "beta".into(),
            cpu_percent: 1.0,
            memory_percent: 9.0,
        };
        let b = ProcessRecord {
            pid: 1,
            name: "Alpha".into(),
            cpu_percent: 5.0,
            memory_percent: 3.0,
        };
        assert_eq!(SortKey::Cpu.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortKey::Memory.compare(&a, &b), Ordering::Less);
        assert_eq!(SortKey::Pid.compare(&a, &b), Ordering::Greater);
        assert_eq!(SortKey::Name.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_top_limits_rows() {
        let rows = quick().top(SortKey::Pid, Some(3));
        assert!(rows.len() <= 3);
        assert!(rows.windows(2).all(|w| w[0].pid < w[1].pid));
    }
}
