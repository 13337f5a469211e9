use std::sync::Arc;
use std::time::Duration;
use taskwatch::config::{CounterMode, SamplerConfig};
use taskwatch::source::test_utils::ScriptedSource;
use taskwatch::{Metric, MetricRegistry, Sampler};
use tokio::sync::watch;

fn sampler_with(
    capacity: usize,
    source: &ScriptedSource,
    config: SamplerConfig,
) -> (Arc<MetricRegistry>, Sampler) {
    let registry = Arc::new(MetricRegistry::with_capacity(capacity));
    let sampler = Sampler::new(registry.clone(), Arc::new(source.clone()), &config);
    (registry, sampler)
}

#[tokio::test]
async fn test_unavailable_gpu_stores_sentinels_and_others_continue() {
    let source = ScriptedSource::steady_all(10.0);
    source.clear_steady(Metric::Gpu);
    let (registry, mut sampler) = sampler_with(10, &source, SamplerConfig::default());

    for _ in 0..5 {
        let report = sampler.tick().await;
        assert_eq!(report.unavailable, vec![Metric::Gpu]);
    }

    let gpu = registry.series(Metric::Gpu);
    assert_eq!(gpu.values(), vec![0.0; 5]);
    assert!(gpu.iter().all(|s| !s.measured));

    assert_eq!(registry.series(Metric::Cpu).values(), vec![10.0; 5]);
    assert_eq!(registry.series(Metric::Memory).len(), 5);
    // Counters spend the first tick establishing their rate baseline.
    assert_eq!(registry.series(Metric::DiskRead).values(), vec![0.0; 4]);
    assert_eq!(registry.series(Metric::NetRecv).len(), 4);
}

#[tokio::test]
async fn test_disk_counter_rate_mode() {
    let source = ScriptedSource::steady_all(1.0);
    source.push_values(Metric::DiskRead, &[100e6, 150e6, 225e6]);
    let (registry, mut sampler) = sampler_with(10, &source, SamplerConfig::default());

    let first = sampler.tick().await;
    assert!(first.baselined.contains(&Metric::DiskRead));
    sampler.tick().await;
    sampler.tick().await;

    assert_eq!(registry.series(Metric::DiskRead).values(), vec![50.0, 75.0]);
}

#[tokio::test]
async fn test_disk_counter_cumulative_mode() {
    let source = ScriptedSource::steady_all(1.0);
    source.push_values(Metric::DiskRead, &[100e6, 150e6, 225e6]);
    let config = SamplerConfig {
        counter_mode: CounterMode::Cumulative,
        ..Default::default()
    };
    let (registry, mut sampler) = sampler_with(10, &source, config);

    for _ in 0..3 {
        sampler.tick().await;
    }

    assert_eq!(
        registry.series(Metric::DiskRead).values(),
        vec![100.0, 150.0, 225.0]
    );
}

#[tokio::test]
async fn test_failed_counter_read_keeps_baseline() {
    let source = ScriptedSource::steady_all(1.0);
    source.push_values(Metric::NetSent, &[10e6]);
    source.push_unavailable(Metric::NetSent, "interface down");
    source.push_values(Metric::NetSent, &[30e6]);
    let (registry, mut sampler) = sampler_with(10, &source, SamplerConfig::default());

    for _ in 0..3 {
        sampler.tick().await;
    }

    let series = registry.series(Metric::NetSent);
    let samples: Vec<_> = series.iter().map(|s| (s.value, s.measured)).collect();
    // 20 MB over the two intervals since the baseline.
    assert_eq!(samples, vec![(0.0, false), (10.0, true)]);
}

#[tokio::test]
async fn test_slow_read_times_out_into_sentinel() {
    let source = ScriptedSource::steady_all(5.0);
    source.set_steady(Metric::Gpu, 0.5);
    source.set_delay(Metric::Cpu, Duration::from_millis(500));
    let config = SamplerConfig {
        read_timeout_ms: Some(50),
        counter_mode: CounterMode::Cumulative,
        ..Default::default()
    };
    let (registry, mut sampler) = sampler_with(4, &source, config);

    let report = sampler.tick().await;

    assert_eq!(report.unavailable, vec![Metric::Cpu]);
    assert!(report.duration < Duration::from_millis(500));
    let cpu = registry.series(Metric::Cpu);
    assert!(!cpu.latest().unwrap().measured);
    assert_eq!(registry.series(Metric::Memory).values(), vec![5.0]);
}

#[test]
fn test_hung_read_does_not_starve_other_metrics() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(4)
        .build()
        .unwrap();
    let source = ScriptedSource::steady_all(5.0);
    source.set_steady(Metric::Gpu, 0.5);
    source.set_delay(Metric::Gpu, Duration::from_secs(3));
    let config = SamplerConfig {
        read_timeout_ms: Some(100),
        counter_mode: CounterMode::Cumulative,
        ..Default::default()
    };
    let (registry, mut sampler) = sampler_with(32, &source, config);

    for _ in 0..20 {
        let report = runtime.block_on(sampler.tick());
        assert_eq!(report.unavailable, vec![Metric::Gpu]);
    }

    let cpu = registry.series(Metric::Cpu);
    assert_eq!(cpu.len(), 20);
    assert!(cpu.iter().all(|s| s.measured));
    assert!(registry.series(Metric::Gpu).iter().all(|s| !s.measured));
    assert_eq!(source.get_call_count(Metric::Gpu), 1);
    runtime.shutdown_background();
}

#[tokio::test]
async fn test_every_metric_present_when_source_fails() {
    let source = ScriptedSource::new();
    let (registry, mut sampler) = sampler_with(3, &source, SamplerConfig::default());

    let report = sampler.tick().await;

    assert_eq!(report.unavailable.len(), Metric::ALL.len());
    let snapshot = registry.snapshot_all();
    assert_eq!(snapshot.len(), Metric::ALL.len());
    for metric in Metric::ALL {
        assert_eq!(snapshot.get(metric).unwrap().values(), vec![0.0]);
    }
}

#[tokio::test]
async fn test_shutdown_mid_tick_leaves_pre_tick_state() {
    let source = ScriptedSource::steady_all(1.0);
    source.set_delay(Metric::Memory, Duration::from_millis(300));
    let (registry, sampler) = sampler_with(5, &source, SamplerConfig::default());
    let before = registry.snapshot_all();

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(sampler.run(rx));

    // The first tick starts immediately and waits on the slow memory read.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.get_call_count(Metric::Memory), 1);
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_millis(200), task)
        .await
        .expect("sampler should stop without waiting for the slow read")
        .unwrap();
    assert_eq!(registry.snapshot_all(), before);
}

#[tokio::test]
async fn test_run_samples_until_shutdown() {
    let source = ScriptedSource::steady_all(2.0);
    let config = SamplerConfig {
        interval_ms: 20,
        ..Default::default()
    };
    let (registry, sampler) = sampler_with(4, &source, config);

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(sampler.run(rx));
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    task.await.unwrap();

    let cpu = registry.series(Metric::Cpu);
    assert_eq!(cpu.len(), 4, "history should be full and bounded");
    assert!(source.get_call_count(Metric::Cpu) >= 4);

    let ticks = source.get_call_count(Metric::Cpu);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(source.get_call_count(Metric::Cpu), ticks, "no ticks after shutdown");
}
