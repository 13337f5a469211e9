use super::MetricSource;
use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted metric source for testing.
///
/// Each metric has a queue of responses; the front of the queue is the next
/// reading. Once a queue is empty the metric falls back to its steady value
/// if one is set, and otherwise reports itself unavailable.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    responses: Arc<Mutex<HashMap<Metric, VecDeque<Result<f64>>>>>,
    steady: Arc<Mutex<HashMap<Metric, f64>>>,
    delays: Arc<Mutex<HashMap<Metric, Duration>>>,
    call_count: Arc<Mutex<HashMap<Metric, u32>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source where every metric always reads `value`.
    pub fn steady_all(value: f64) -> Self {
        let source = Self::new();
        for metric in Metric::ALL {
            source.set_steady(metric, value);
        }
        source
    }

    /// Queue raw readings for a metric.
    pub fn push_values(&self, metric: Metric, values: &[f64]) {
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.entry(metric).or_default();
        queue.extend(values.iter().map(|v| Ok(*v)));
    }

    /// Queue a failed reading for a metric.
    pub fn push_unavailable(&self, metric: Metric, reason: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry(metric)
            .or_default()
            .push_back(Err(MonitorError::unavailable(metric, reason)));
    }

    /// Value returned once the queue for `metric` is drained.
    pub fn set_steady(&self, metric: Metric, value: f64) {
        self.steady.lock().unwrap().insert(metric, value);
    }

    /// Remove the steady value so a drained metric reports unavailable.
    pub fn clear_steady(&self, metric: Metric) {
        self.steady.lock().unwrap().remove(&metric);
    }

    /// Make every read of `metric` block for `delay` first.
    pub fn set_delay(&self, metric: Metric, delay: Duration) {
        self.delays.lock().unwrap().insert(metric, delay);
    }

    /// Number of times `metric` was read.
    pub fn get_call_count(&self, metric: Metric) -> u32 {
        let call_count = self.call_count.lock().unwrap();
        call_count.get(&metric).copied().unwrap_or(0)
    }
}

impl MetricSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn read(&self, metric: Metric) -> Result<f64> {
        {
            let mut call_count = self.call_count.lock().unwrap();
            *call_count.entry(metric).or_insert(0) += 1;
        }

        let delay = self.delays.lock().unwrap().get(&metric).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut responses = self.responses.lock().unwrap();
        if let Some(response) = responses.get_mut(&metric).and_then(VecDeque::pop_front) {
            return response;
        }
        drop(responses);

        self.steady
            .lock()
            .unwrap()
            .get(&metric)
            .copied()
            .ok_or_else(|| MonitorError::unavailable(metric, "no scripted response"))
    }
}
