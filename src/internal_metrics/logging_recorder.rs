//! A metrics recorder that periodically logs all captured metrics.

use itertools::Itertools;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A metrics recorder that logs everything it has captured through `tracing`
/// once per aggregation interval.
///
/// Counters and gauges are logged as current values. Histogram samples are
/// drained on every report and summarised as count, mean and max.
#[derive(Clone)]
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl std::fmt::Debug for LoggingRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingRecorder").finish_non_exhaustive()
    }
}

impl Default for LoggingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_key(key: &Key) -> String {
    let mut labels = key.labels().peekable();
    if labels.peek().is_none() {
        return key.name().to_string();
    }
    format!(
        "{}{{{}}}",
        key.name(),
        labels.map(|l| format!("{}={}", l.key(), l.value())).join(",")
    )
}

impl LoggingRecorder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new(AtomicStorage)),
        }
    }

    /// Logs one report of every registered metric.
    pub fn report(&self) {
        tracing::debug!("--- Metrics Snapshot ---");

        let counters = self.registry.get_counter_handles();
        for (key, counter) in counters.iter().sorted_by_key(|(k, _)| describe_key(k)) {
            let value = counter.load(Ordering::Relaxed);
            tracing::info!("[Counter] {}: {}", describe_key(key), value);
        }

        for (key, gauge) in self.registry.get_gauge_handles() {
            let value = f64::from_bits(gauge.load(Ordering::Relaxed));
            tracing::info!("[Gauge] {}: {}", describe_key(&key), value);
        }

        for (key, histogram) in self.registry.get_histogram_handles() {
            let mut count = 0usize;
            let mut sum = 0.0;
            let mut max = f64::MIN;
            histogram.clear_with(|chunk| {
                count += chunk.len();
                for value in chunk {
                    sum += value;
                    max = max.max(*value);
                }
            });
            if count > 0 {
                tracing::info!(
                    "[Histogram] {}: count={} mean={:.6} max={:.6}",
                    describe_key(&key),
                    count,
                    sum / count as f64,
                    max
                );
            }
        }
    }

    /// Returns the task that reports every `aggregation_interval` until the
    /// shutdown signal changes.
    pub fn reporter(
        &self,
        aggregation_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let recorder = self.clone();
        async move {
            let mut ticker = tokio::time::interval(aggregation_interval);
            // The first tick completes immediately and there is nothing to report yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Metrics logging task received shutdown signal.");
                        break;
                    }
                    _ = ticker.tick() => recorder.report(),
                }
            }
        }
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata<'static> {
        Metadata::new("test", metrics::Level::INFO, Some("test"))
    }

    #[test]
    fn test_counters_accumulate() {
        let recorder = LoggingRecorder::new();
        let key = Key::from_name("sampler_ticks_total");
        recorder.register_counter(&key, &metadata()).increment(2);
        recorder.register_counter(&key, &metadata()).increment(3);

        let value = recorder
            .registry
            .get_counter_handles()
            .get(&key)
            .unwrap()
            .load(Ordering::Relaxed);
        assert_eq!(value, 5);
    }

    #[test]
    fn test_report_drains_histograms() {
        let recorder = LoggingRecorder::new();
        let key = Key::from_name("sampler_tick_duration_seconds");
        let histogram = recorder.register_histogram(&key, &metadata());
        histogram.record(0.25);
        histogram.record(0.75);

        recorder.report();

        let handles = recorder.registry.get_histogram_handles();
        assert!(handles.get(&key).unwrap().data().is_empty());
    }

    #[test]
    fn test_labelled_key_description() {
        let key = Key::from_parts("metric_unavailable_total", vec![metrics::Label::new("metric", "gpu")]);
        assert_eq!(describe_key(&key), "metric_unavailable_total{metric=gpu}");
        assert_eq!(describe_key(&Key::from_name("plain")), "plain");
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let recorder = LoggingRecorder::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(recorder.reporter(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}
