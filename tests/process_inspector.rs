use std::sync::Arc;
use taskwatch::config::{ProcessConfig, SamplerConfig};
use taskwatch::source::test_utils::ScriptedSource;
use taskwatch::{Metric, MetricRegistry, MonitorError, ProcessInspector, Sampler, SnapshotReader, SortKey};

fn inspector() -> ProcessInspector {
    ProcessInspector::new(&ProcessConfig { cpu_sample_ms: 0 })
}

#[test]
fn test_inspect_errors() {
    let inspector = inspector();
    assert!(matches!(
        inspector.inspect("not-a-pid"),
        Err(MonitorError::InvalidArgument(_))
    ));
    assert_eq!(
        inspector.inspect("4000000000").unwrap_err(),
        MonitorError::ProcessNotFound(4_000_000_000)
    );
}

#[test]
fn test_inspect_self_matches_listing() {
    let inspector = inspector();
    let me = std::process::id();
    let details = inspector.inspect_pid(me).unwrap();
    let listed = inspector
        .list_processes()
        .find(|p| p.pid == me)
        .expect("current process should be listed");
    assert_eq!(details.record.name, listed.name);
}

#[test]
fn test_top_by_memory_is_sorted() {
    let rows = inspector().top(SortKey::Memory, Some(5));
    assert!(!rows.is_empty());
    assert!(rows.len() <= 5);
    assert!(rows
        .windows(2)
        .all(|w| w[0].memory_percent >= w[1].memory_percent));
}

#[test]
fn test_cpu_sample_window_reports_usage() {
    let inspector = ProcessInspector::new(&ProcessConfig { cpu_sample_ms: 250 });
    let details = inspector.inspect_pid(std::process::id()).unwrap();
    assert!(details.record.cpu_percent >= 0.0);
}

#[tokio::test]
async fn test_inspect_failures_do_not_touch_registry() {
    let registry = Arc::new(MetricRegistry::with_capacity(4));
    let reader = SnapshotReader::new(registry.clone());
    let mut sampler = Sampler::new(
        registry.clone(),
        Arc::new(ScriptedSource::steady_all(3.0)),
        &SamplerConfig::default(),
    );
    sampler.tick().await;
    let before = reader.read_all();

    let inspector = inspector();
    assert!(inspector.inspect("abc").is_err());
    assert!(inspector.inspect("4000000000").is_err());

    assert_eq!(reader.read_all(), before);
    sampler.tick().await;
    assert_eq!(reader.read_metric(Metric::Cpu).values(), vec![3.0, 3.0]);
}
