//! Configuration management for taskwatch
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer compiled defaults, a `taskwatch.toml` file,
//! `TASKWATCH_` environment variables and command-line flags, in that order
//! of increasing precedence.

use crate::cli::Cli;
use crate::error::MonitorError;
use crate::metric::Metric;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "taskwatch.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// How cumulative OS counters (disk, network) are stored.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Megabytes per second since the previous reading.
    #[default]
    Rate,
    /// The running total in megabytes.
    Cumulative,
}

impl fmt::Display for CounterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterMode::Rate => write!(f, "rate"),
            CounterMode::Cumulative => write!(f, "cumulative"),
        }
    }
}

/// Configuration for the sampling loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Time between ticks in milliseconds.
    pub interval_ms: u64,
    /// Deadline for a single metric read. Defaults to, and is capped at, the
    /// tick interval.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub counter_mode: CounterMode,
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        let interval = self.interval();
        self.read_timeout_ms
            .map(Duration::from_millis)
            .map_or(interval, |t| t.min(interval))
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            read_timeout_ms: None,
            counter_mode: CounterMode::Rate,
        }
    }
}

/// Configuration for per-metric history.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Samples kept per metric unless overridden.
    pub length: usize,
    /// Zero samples each series starts with.
    #[serde(default)]
    pub prefill: usize,
    /// Per-metric history lengths, e.g. `[history.lengths] cpu = 30`.
    #[serde(default)]
    pub lengths: BTreeMap<Metric, usize>,
}

impl HistoryConfig {
    pub fn length_for(&self, metric: Metric) -> usize {
        self.lengths.get(&metric).copied().unwrap_or(self.length)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            length: 60,
            prefill: 0,
            lengths: BTreeMap::new(),
        }
    }
}

/// Configuration for GPU sampling.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GpuConfig {
    /// When false, the gpu series only receives sentinels.
    pub enabled: bool,
    /// Which device to report when several are present.
    pub device_index: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_index: 0,
        }
    }
}

/// Configuration for process listing and inspection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProcessConfig {
    /// Window between the two refreshes used to measure per-process CPU.
    /// Zero takes a single refresh, in which case CPU reads as 0.
    pub cpu_sample_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self { cpu_sample_ms: 200 }
    }
}

/// The format for stdout output.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    PlainText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "JSON"),
            OutputFormat::PlainText => write!(f, "Plain Text"),
        }
    }
}

/// Configuration for the console renderer.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// How often the renderer pulls a snapshot, in milliseconds.
    pub refresh_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::PlainText,
            refresh_ms: 1000,
        }
    }
}

/// Configuration for the sampler's own counters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Log self-metrics to the console periodically.
    pub log_metrics: bool,
    pub log_aggregation_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_metrics: false,
            log_aggregation_seconds: 60,
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file, the
    /// environment and the command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        match &cli.config {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
            }
            None => {}
        }

        let config: Config = figment
            // e.g. TASKWATCH_SAMPLER__INTERVAL_MS=500
            .merge(Env::prefixed("TASKWATCH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> std::result::Result<(), MonitorError> {
        if self.sampler.interval_ms == 0 {
            return Err(MonitorError::Config(
                "sampler.interval_ms must be greater than 0".into(),
            ));
        }
        if self.sampler.read_timeout_ms == Some(0) {
            return Err(MonitorError::Config(
                "sampler.read_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.history.length == 0 {
            return Err(MonitorError::Config(
                "history.length must be greater than 0".into(),
            ));
        }
        if let Some((metric, _)) = self.history.lengths.iter().find(|(_, len)| **len == 0) {
            return Err(MonitorError::Config(format!(
                "history.lengths.{} must be greater than 0",
                metric
            )));
        }
        if self.output.refresh_ms == 0 {
            return Err(MonitorError::Config(
                "output.refresh_ms must be greater than 0".into(),
            ));
        }
        if self.metrics.log_metrics && self.metrics.log_aggregation_seconds == 0 {
            return Err(MonitorError::Config(
                "metrics.log_aggregation_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sampler: SamplerConfig::default(),
            history: HistoryConfig::default(),
            gpu: GpuConfig::default(),
            process: ProcessConfig::default(),
            output: OutputConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_read_timeout_defaults_to_and_is_capped_by_interval() {
        let mut sampler = SamplerConfig::default();
        assert_eq!(sampler.read_timeout(), Duration::from_secs(1));
        sampler.read_timeout_ms = Some(250);
        assert_eq!(sampler.read_timeout(), Duration::from_millis(250));
        sampler.read_timeout_ms = Some(5000);
        assert_eq!(sampler.read_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_history_override() {
        let mut history = HistoryConfig::default();
        history.lengths.insert(Metric::Cpu, 30);
        assert_eq!(history.length_for(Metric::Cpu), 30);
        assert_eq!(history.length_for(Metric::Gpu), 60);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = Config::default();
        config.sampler.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.lengths.insert(Metric::NetRecv, 0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history.lengths.net_recv"));
    }
}
