//! Console rendering of snapshots and process tables.
//!
//! The renderer only pulls: it asks a [`SnapshotReader`] for the latest
//! registry snapshot on its own cadence and never hooks into the sampler.

use crate::config::{CounterMode, OutputFormat};
use crate::metric::Metric;
use crate::process::{ProcessDetails, ProcessRecord};
use crate::snapshot::{RegistrySnapshot, SeriesSnapshot, SnapshotReader};
use chrono::Local;
use itertools::Itertools;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Shown in place of a value when the latest sample is a sentinel.
const UNAVAILABLE: &str = "n/a";

/// Formats monitor output as plain text or JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    format: OutputFormat,
    counter_mode: CounterMode,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            counter_mode: CounterMode::default(),
        }
    }

    /// Sets how counter values are labelled (`MB/s` for rates, `MB` for totals).
    pub fn with_counter_mode(mut self, counter_mode: CounterMode) -> Self {
        self.counter_mode = counter_mode;
        self
    }

    fn unit(&self, metric: Metric) -> String {
        let unit = metric.descriptor().unit;
        if metric.is_counter() && self.counter_mode == CounterMode::Rate {
            format!("{}/s", unit)
        } else {
            unit.to_string()
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn render_snapshot(&self, snapshot: &RegistrySnapshot) -> String {
        match self.format {
            OutputFormat::Json => self.snapshot_json(snapshot).to_string(),
            OutputFormat::PlainText => self.snapshot_text(snapshot),
        }
    }

    pub fn render_processes(&self, records: &[ProcessRecord]) -> String {
        match self.format {
            OutputFormat::Json => Value::Array(records.iter().map(process_json).collect()).to_string(),
            OutputFormat::PlainText => {
                let header = format!("{:>8}  {:<28} {:>8} {:>8}", "PID", "NAME", "CPU%", "MEM%");
                std::iter::once(header)
                    .chain(records.iter().map(|r| {
                        format!(
                            "{:>8}  {:<28} {:>8.1} {:>8.1}",
                            r.pid,
                            truncate(&r.name, 28),
                            r.cpu_percent,
                            r.memory_percent
                        )
                    }))
                    .join("\n")
            }
        }
    }

    pub fn render_details(&self, details: &ProcessDetails) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut value = process_json(&details.record);
                value["status"] = json!(details.status);
                value["thread_count"] = json!(details.thread_count);
                value.to_string()
            }
            OutputFormat::PlainText => {
                let threads = details
                    .thread_count
                    .map_or_else(|| UNAVAILABLE.to_string(), |n| n.to_string());
                [
                    format!("PID:     {}", details.record.pid),
                    format!("Name:    {}", details.record.name),
                    format!("Status:  {}", details.status),
                    format!("CPU:     {:.1}%", details.record.cpu_percent),
                    format!("Memory:  {:.1}%", details.record.memory_percent),
                    format!("Threads: {}", threads),
                ]
                .join("\n")
            }
        }
    }

    /// Prints a snapshot every `refresh` until the shutdown signal changes.
    pub async fn run(
        self,
        reader: SnapshotReader,
        refresh: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(format = %self.format, refresh_ms = refresh.as_millis() as u64, "Renderer started.");
        let mut ticker = tokio::time::interval(refresh);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Renderer received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = reader.read_all();
                    debug!(series = snapshot.len(), "rendering snapshot");
                    println!("{}", self.render_snapshot(&snapshot));
                }
            }
        }
        info!("Renderer finished.");
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut short: String = name.chars().take(width - 1).collect();
        short.push('~');
        short
    }
}

impl Renderer {
    fn latest_text(&self, series: &SeriesSnapshot) -> String {
        match series.latest() {
            Some(sample) if sample.measured => {
                format!("{:>9.2} {:<4}", sample.value, self.unit(series.metric))
            }
            _ => format!("{:>9} {:<4}", UNAVAILABLE, ""),
        }
    }

    fn snapshot_text(&self, snapshot: &RegistrySnapshot) -> String {
        let header = format!("[{}]", Local::now().format(crate::series::LABEL_FORMAT));
        std::iter::once(header)
            .chain(snapshot.iter().map(|series| {
                let peak = series
                    .max()
                    .map_or_else(|| UNAVAILABLE.to_string(), |max| format!("{:.2}", max));
                format!(
                    "{:<14} {}  peak {:>9}  ({}/{} samples)",
                    series.metric.descriptor().title,
                    self.latest_text(series),
                    peak,
                    series.len(),
                    series.capacity
                )
            }))
            .join("\n")
    }

    fn series_json(&self, series: &SeriesSnapshot) -> Value {
        let latest = series.latest().filter(|s| s.measured).map(|s| s.value);
        json!({
            "title": series.metric.descriptor().title,
            "unit": self.unit(series.metric),
            "capacity": series.capacity,
            "latest": latest,
            "values": series.values(),
            "labels": series.labels(),
            "measured": series.samples.iter().map(|s| s.measured).collect::<Vec<_>>(),
        })
    }

    fn snapshot_json(&self, snapshot: &RegistrySnapshot) -> Value {
        let metrics: serde_json::Map<String, Value> = snapshot
            .iter()
            .map(|series| (series.metric.key().to_string(), self.series_json(series)))
            .collect();
        json!({
            "timestamp": Local::now().to_rfc3339(),
            "metrics": metrics,
        })
    }
}

fn process_json(record: &ProcessRecord) -> Value {
    json!({
        "pid": record.pid,
        "name": record.name,
        "cpu_percent": record.cpu_percent,
        "memory_percent": record.memory_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricRegistry;
    use crate::series::Sample;

    fn registry() -> MetricRegistry {
        let registry = MetricRegistry::with_capacity(3);
        registry.append(Metric::Cpu, Sample::measured(12.5));
        registry.append(Metric::Gpu, Sample::sentinel());
        registry
    }

    #[test]
    fn test_plain_text_snapshot_lists_every_metric() {
        let text = Renderer::new(OutputFormat::PlainText).render_snapshot(&registry().snapshot_all());
        assert_eq!(text.lines().count(), 1 + Metric::ALL.len());
        let cpu_line = text.lines().find(|l| l.contains(Metric::Cpu.descriptor().title)).unwrap();
        assert!(cpu_line.contains("12.50"));
        let gpu_line = text.lines().find(|l| l.contains(Metric::Gpu.descriptor().title)).unwrap();
        assert!(gpu_line.contains(UNAVAILABLE));
    }

    #[test]
    fn test_json_snapshot_marks_sentinels() {
        let text = Renderer::new(OutputFormat::Json).render_snapshot(&registry().snapshot_all());
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["metrics"]["cpu"]["latest"], json!(12.5));
        assert_eq!(value["metrics"]["gpu"]["latest"], Value::Null);
        assert_eq!(value["metrics"]["gpu"]["values"], json!([0.0]));
        assert_eq!(value["metrics"]["gpu"]["measured"], json!([false]));
        assert_eq!(value["metrics"]["memory"]["values"], json!([]));
    }

    #[test]
    fn test_counter_units_follow_mode() {
        let rate = Renderer::new(OutputFormat::Json);
        assert_eq!(rate.unit(Metric::DiskRead), "MB/s");
        assert_eq!(rate.unit(Metric::Cpu), "%");
        let total = rate.with_counter_mode(CounterMode::Cumulative);
        assert_eq!(total.unit(Metric::NetSent), "MB");
    }

    #[test]
    fn test_process_table() {
        let records = vec![ProcessRecord {
            pid: 7,
            name: "a-very-long-process-name-that-will-not-fit".into(),
            cpu_percent: 3.25,
            memory_percent: 1.0,
        }];
        let text = Renderer::new(OutputFormat::PlainText).render_processes(&records);
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains('~'));
        assert!(row.contains("3.2") || row.contains("3.3"));

        let json: Value = serde_json::from_str(&Renderer::new(OutputFormat::Json).render_processes(&records)).unwrap();
        assert_eq!(json[0]["pid"], json!(7));
    }

    #[test]
    fn test_details_json_includes_status_and_threads() {
        let details = ProcessDetails {
            record: ProcessRecord {
                pid: 1,
                name: "init".into(),
                cpu_percent: 0.0,
                memory_percent: 0.5,
            },
            status: "Sleeping".into(),
            thread_count: None,
        };
        let json: Value = serde_json::from_str(&Renderer::new(OutputFormat::Json).render_details(&details)).unwrap();
        assert_eq!(json["status"], json!("Sleeping"));
        assert_eq!(json["thread_count"], Value::Null);

        let text = Renderer::default().render_details(&details);
        assert!(text.contains("Threads: n/a"));
    }
}
