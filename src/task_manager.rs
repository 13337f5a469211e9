//! Owns the background tasks of a running monitor.
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Handles = Vec<(&'static str, JoinHandle<()>)>;

/// Tracks named tasks and stops them together.
///
/// Every task is expected to watch the receiver returned by
/// [`TaskManager::get_shutdown_rx`] and return once it changes.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Handles>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    fn handles(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `future` on the runtime and keeps its handle under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles().push((name, handle));
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Names of the tasks that have not finished yet.
    pub fn running(&self) -> Vec<&'static str> {
        self.handles()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Waits up to `deadline` for every task to finish.
    ///
    /// Tasks still running at the deadline are aborted. Returns `true` if all
    /// tasks finished on their own without panicking.
    pub async fn shutdown(self, deadline: Duration) -> bool {
        let handles: Handles = self.handles().drain(..).collect();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (task_names, handles): (Vec<&'static str>, Vec<JoinHandle<()>>) =
            handles.into_iter().unzip();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = match tokio::time::timeout(deadline, join_all(handles)).await {
            Ok(results) => results,
            Err(_) => {
                let stuck: Vec<&'static str> = task_names
                    .iter()
                    .zip(&aborts)
                    .filter(|(_, abort)| !abort.is_finished())
                    .map(|(name, _)| *name)
                    .collect();
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    tasks = ?stuck,
                    "Tasks did not stop before the deadline, aborting."
                );
                aborts.iter().for_each(|abort| abort.abort());
                return false;
            }
        };

        let mut panicked = Vec::new();
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked.push(task_name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
            true
        } else {
            error!(tasks = ?panicked, "{} tasks panicked.", panicked.len());
            false
        }
    }
}
