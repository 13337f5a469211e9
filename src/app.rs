//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    internal_metrics,
    registry::MetricRegistry,
    render::Renderer,
    sampler::Sampler,
    snapshot::SnapshotReader,
    source::{MetricSource, SystemSource},
    task_manager::TaskManager,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// How long [`App::run`] waits for tasks after the shutdown signal.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// A handle to the running monitor.
pub struct App {
    task_manager: TaskManager,
    registry: Arc<MetricRegistry>,
    shutdown_deadline: Duration,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// A read handle onto the live registry.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(self.registry.clone())
    }

    pub fn registry(&self) -> Arc<MetricRegistry> {
        self.registry.clone()
    }

    /// Names of background tasks still running.
    pub fn running_tasks(&self) -> Vec<&'static str> {
        self.task_manager.running()
    }

    /// Waits for the shutdown signal and then stops all tasks.
    ///
    /// Returns `true` if every task stopped cleanly before the deadline.
    pub async fn run(self) -> bool {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow_and_update() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received in run function. Waiting for tasks to complete...");
        self.shutdown().await
    }

    /// Stops all tasks, waiting at most the shutdown deadline.
    ///
    /// The caller is responsible for having sent the shutdown signal.
    pub async fn shutdown(self) -> bool {
        let clean = self.task_manager.shutdown(self.shutdown_deadline).await;
        info!(clean, "All tasks shut down.");
        clean
    }
}

/// Builder for the monitor.
///
/// Components can be overridden for testing.
pub struct AppBuilder {
    config: Config,
    source_override: Option<Arc<dyn MetricSource>>,
    renderer: Option<Renderer>,
    shutdown_deadline: Duration,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source_override: None,
            renderer: None,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }

    /// Replaces the OS-backed metric source.
    pub fn source_override(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source_override = Some(source);
        self
    }

    /// Prints snapshots on the configured refresh interval while running.
    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    /// Builds all components and starts the background tasks.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Self-metrics
        // =========================================================================
        internal_metrics::install_logging_recorder(&config.metrics, &task_manager);

        // =========================================================================
        // 2. Shared state and source
        // =========================================================================
        let registry = Arc::new(MetricRegistry::from_config(&config.history));
        debug!(?registry, "Registry initialised");

        let source: Arc<dyn MetricSource> = match self.source_override {
            Some(source) => source,
            None => {
                let gpu = config.gpu.clone();
                tokio::task::spawn_blocking(move || Arc::new(SystemSource::new(&gpu)) as Arc<dyn MetricSource>)
                    .await?
            }
        };
        info!(source = source.name(), "Metric source ready");

        // =========================================================================
        // 3. Sampler
        // =========================================================================
        let sampler = Sampler::new(registry.clone(), source, &config.sampler);
        task_manager.spawn("Sampler", sampler.run(task_manager.get_shutdown_rx()));

        // =========================================================================
        // 4. Renderer
        // =========================================================================
        if let Some(renderer) = self.renderer {
            let reader = SnapshotReader::new(registry.clone());
            let refresh = Duration::from_millis(config.output.refresh_ms);
            task_manager.spawn(
                "Renderer",
                renderer.run(reader, refresh, task_manager.get_shutdown_rx()),
            );
        }

        info!("Monitor initialised successfully.");
        Ok(App {
            task_manager,
            registry,
            shutdown_deadline: self.shutdown_deadline,
        })
    }
}
