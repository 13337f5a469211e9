//! taskwatch - real-time local resource sampler
//!
//! Samples system utilisation in the background and prints the recent
//! history, or queries the process table on demand.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use taskwatch::{
    app::App,
    cli::{Cli, Command},
    config::Config,
    process::ProcessInspector,
    render::Renderer,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn log_configuration(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Sample Interval: {}ms", config.sampler.interval_ms);
    info!("Read Timeout: {}ms", config.sampler.read_timeout().as_millis());
    info!("Counter Mode: {}", config.sampler.counter_mode);
    info!("History Length: {}", config.history.length);
    for (metric, length) in &config.history.lengths {
        info!("History Length ({}): {}", metric, length);
    }
    info!("History Prefill: {}", config.history.prefill);
    info!(
        "GPU Sampling: {}",
        if config.gpu.enabled {
            format!("Enabled (device {})", config.gpu.device_index)
        } else {
            "Disabled".to_string()
        }
    );
    info!("Process CPU Sample: {}ms", config.process.cpu_sample_ms);
    info!("Output Format: {}", config.output.format);
    info!("Refresh Interval: {}ms", config.output.refresh_ms);
    info!("Log Metrics: {}", config.metrics.log_metrics);
    info!(
        "Log Aggregation Interval: {}s",
        config.metrics.log_aggregation_seconds
    );
    info!("-------------------------------------------------------");
}

async fn watch(config: Config) -> Result<ExitCode> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let renderer = Renderer::new(config.output.format).with_counter_mode(config.sampler.counter_mode);
    let app = App::builder(config)
        .renderer(renderer)
        .build(shutdown_rx)
        .await?;

    info!("taskwatch initialized successfully. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send(true)?;

    if app.run().await {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let renderer = Renderer::new(config.output.format);
    let inspector = ProcessInspector::new(&config.process);

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(config).await,
        Command::Ps { top, sort } => {
            let records = tokio::task::spawn_blocking(move || inspector.top(sort, top)).await?;
            println!("{}", renderer.render_processes(&records));
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { pid } => {
            match tokio::task::spawn_blocking(move || inspector.inspect(&pid)).await? {
                Ok(details) => {
                    println!("{}", renderer.render_details(&details));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            init_tracing("error");
            error!("Failed to load configuration: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_level);
    info!("taskwatch starting up...");
    log_configuration(&config);

    match run(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            error!("taskwatch failed: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
