//! Health monitor tests

use std::sync::Arc;
use std::time::Duration;

use homefleet::errors::FleetError;
use homefleet::health::monitor::{HealthMonitor, HostSource, RefreshOutcome};
use homefleet::health::pipeline::{HealthPipeline, Thresholds};
use homefleet::health::query::HealthQuery;
use homefleet::models::health::HealthStatus;
use homefleet::models::host::{HostDescriptor, Service};
use homefleet::storage::inventory::HostStore;
use homefleet::workers::refresh::RefreshInterval;

use crate::support::{fast_poll, metrics, MockHealthQuery};

fn monitor(
    store: &HostStore,
    remote: Arc<MockHealthQuery>,
    local: Arc<MockHealthQuery>,
) -> HealthMonitor {
    let remote: Arc<dyn HealthQuery> = remote;
    let local: Arc<dyn HealthQuery> = local;
    let pipeline = HealthPipeline::new(remote, local, Thresholds::default());
    let store = store.clone();
    let source: HostSource = Arc::new(move || store.snapshot());
    HealthMonitor::new(pipeline, source, 8, fast_poll())
}

#[tokio::test]
async fn test_refresh_classifies_every_host() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "pw", Some(Service::Dashy)).unwrap();
    store.add("10.0.0.2", "pi", "pw", Some(Service::Dashy)).unwrap();
    store.add("10.0.0.3", "pi", "pw", Some(Service::Dashy)).unwrap();
    let remote = Arc::new(
        MockHealthQuery::new()
            .with_metrics("10.0.0.2", metrics(95.0, 20, 30))
            .failing_on("10.0.0.3"),
    );
    let monitor = monitor(&store, remote, Arc::new(MockHealthQuery::new()));

    assert!(monitor.refresh().unwrap().started());
    monitor.wait_for_refresh().await;

    let snapshots = monitor.snapshots();
    let statuses: Vec<(u64, HealthStatus)> = snapshots.iter().map(|s| (s.host_id, s.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (1, HealthStatus::Healthy),
            (2, HealthStatus::Critical),
            (3, HealthStatus::Error),
        ]
    );
    let failed = monitor.snapshot(3).unwrap();
    assert!(failed.metrics.is_none());
    assert!(failed.metrics_error.is_some());
    assert!(!monitor.is_refreshing());
}

#[tokio::test]
async fn test_refresh_while_in_flight_is_a_no_op() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "pw", None).unwrap();
    store.add("10.0.0.2", "pi", "pw", None).unwrap();
    let remote = Arc::new(MockHealthQuery::new().with_delay(Duration::from_millis(100)));
    let monitor = monitor(&store, remote.clone(), Arc::new(MockHealthQuery::new()));

    let first = monitor.refresh().unwrap();
    assert!(first.started());
    assert!(monitor.is_refreshing());
    assert_eq!(monitor.refresh().unwrap(), RefreshOutcome::InFlight);

    monitor.wait_for_refresh().await;
    assert_eq!(remote.queries(), 2);
    assert_eq!(monitor.snapshots().len(), 2);

    // the slot is free again afterwards
    assert!(monitor.refresh().unwrap().started());
    monitor.wait_for_refresh().await;
    assert_eq!(remote.queries(), 4);
}

#[tokio::test]
async fn test_removed_hosts_drop_out_of_the_cache() {
    let store = HostStore::new();
    let a = store.add("10.0.0.1", "pi", "pw", None).unwrap();
    store.add("10.0.0.2", "pi", "pw", None).unwrap();
    let monitor = monitor(&store, Arc::new(MockHealthQuery::new()), Arc::new(MockHealthQuery::new()));

    monitor.refresh().unwrap();
    monitor.wait_for_refresh().await;
    assert_eq!(monitor.snapshots().len(), 2);

    store.remove(a.id).unwrap();
    monitor.refresh().unwrap();
    monitor.wait_for_refresh().await;
    let ids: Vec<u64> = monitor.snapshots().iter().map(|s| s.host_id).collect();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn test_export_reads_the_cache_only() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "pw", None).unwrap();
    store.add("nas.lan", "admin", "pw", None).unwrap();
    let remote = Arc::new(MockHealthQuery::new());
    let monitor = monitor(&store, remote.clone(), Arc::new(MockHealthQuery::new()));

    assert_eq!(monitor.export_text(), "");

    monitor.refresh().unwrap();
    monitor.wait_for_refresh().await;
    let queries = remote.queries();

    let report = monitor.export_text();
    assert_eq!(report.split("\n\n").count(), 2);
    assert!(report.contains("Host #1 10.0.0.1"));
    assert!(report.contains("Host #2 nas.lan"));
    assert_eq!(remote.queries(), queries);
}

#[tokio::test]
async fn test_loopback_host_is_measured_locally() {
    let store = HostStore::new();
    store.add("127.0.0.1", "me", "pw", None).unwrap();
    store.add("10.0.0.9", "pi", "pw", None).unwrap();
    let remote = Arc::new(MockHealthQuery::new());
    let local = Arc::new(MockHealthQuery::new());
    let monitor = monitor(&store, remote.clone(), local.clone());

    monitor.refresh().unwrap();
    monitor.wait_for_refresh().await;
    assert_eq!(local.queries(), 1);
    assert_eq!(remote.queries(), 1);
}

#[tokio::test]
async fn test_auto_refresh_toggle() {
    let store = HostStore::new();
    let monitor = monitor(&store, Arc::new(MockHealthQuery::new()), Arc::new(MockHealthQuery::new()));

    assert_eq!(monitor.auto_refresh_interval(), None);
    monitor.enable_auto_refresh(RefreshInterval::TenSeconds);
    assert_eq!(monitor.auto_refresh_interval(), Some(RefreshInterval::TenSeconds));

    monitor.enable_auto_refresh(RefreshInterval::OneMinute);
    assert_eq!(monitor.auto_refresh_interval(), Some(RefreshInterval::OneMinute));

    assert!(monitor.disable_auto_refresh());
    assert!(!monitor.disable_auto_refresh());
    assert_eq!(monitor.auto_refresh_interval(), None);
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_refresh_rejects_hosts_that_fail_access_checks() {
    let remote = Arc::new(MockHealthQuery::new());
    let remote_query: Arc<dyn HealthQuery> = remote.clone();
    let local_query: Arc<dyn HealthQuery> = Arc::new(MockHealthQuery::new());
    let pipeline = HealthPipeline::new(remote_query, local_query, Thresholds::default());
    let source: HostSource = Arc::new(|| {
        vec![
            HostDescriptor::new(1, "10.0.0.1", "pi", "pw", None),
            HostDescriptor::new(2, "-oProxyCommand=touch /tmp/x", "", "", None),
        ]
    });
    let monitor = HealthMonitor::new(pipeline, source, 8, fast_poll());

    match monitor.refresh() {
        Err(FleetError::ValidationFailed(issues)) => {
            assert_eq!(issues.len(), 3);
            assert!(issues.iter().all(|i| i.host_id == 2));
        }
        other => panic!("refresh was not rejected: {:?}", other),
    }
    assert!(!monitor.is_refreshing());
    monitor.wait_for_refresh().await;
    assert_eq!(remote.queries(), 0);
    assert!(monitor.snapshots().is_empty());
}

#[tokio::test]
async fn test_hosts_without_a_service_still_get_health_checks() {
    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "pw", None).unwrap();
    let remote = Arc::new(MockHealthQuery::new());
    let monitor = monitor(&store, remote.clone(), Arc::new(MockHealthQuery::new()));

    assert!(monitor.refresh().unwrap().started());
    monitor.wait_for_refresh().await;
    assert_eq!(remote.queries(), 1);
}
