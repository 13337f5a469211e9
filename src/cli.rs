//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments using `clap`. The flags
//! that mirror configuration keys are fed into `figment` as the highest
//! precedence layer through the [`Provider`] implementation below.

use crate::config::CounterMode;
use crate::process::SortKey;
use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Real-time local resource monitor: CPU, memory, disk, network and GPU
/// history plus a live process table.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Sampling interval in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    pub interval_ms: Option<u64>,

    /// Number of samples kept per metric.
    #[arg(long, value_name = "N", global = true)]
    pub history: Option<usize>,

    /// Store disk and network counters as rates or running totals.
    #[arg(long, value_enum, global = true)]
    pub counter_mode: Option<CounterMode>,

    /// Print JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sample continuously and print the latest history until Ctrl-C.
    Watch,
    /// Print the current process table.
    Ps {
        /// Only show the first N rows.
        #[arg(long, value_name = "N")]
        top: Option<usize>,
        /// Sort order of the table.
        #[arg(long, value_enum, default_value_t = SortKey::Cpu)]
        sort: SortKey,
    },
    /// Show details for one process.
    Inspect {
        /// Process id.
        pid: String,
    },
}

fn set(dict: &mut Dict, section: &str, key: &str, value: Value) {
    let entry = dict
        .entry(section.to_string())
        .or_insert_with(|| Value::from(Dict::new()));
    if let Value::Dict(_, inner) = entry {
        inner.insert(key.to_string(), value);
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(interval) = self.interval_ms {
            set(&mut dict, "sampler", "interval_ms", Value::from(interval));
        }

        if let Some(mode) = self.counter_mode {
            set(&mut dict, "sampler", "counter_mode", Value::from(mode.to_string()));
        }

        if let Some(length) = self.history {
            set(&mut dict, "history", "length", Value::from(length));
        }

        // `--json` only ever switches JSON on; leaving it off keeps whatever
        // the file or environment chose.
        if self.json {
            set(&mut dict, "output", "format", Value::from("Json"));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
