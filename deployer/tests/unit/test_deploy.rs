//! Deployment orchestration tests

use std::sync::Arc;
use std::time::Duration;

use homefleet::errors::FleetError;
use homefleet::installers::InstallOutcome;
use homefleet::models::event::{PipelineEvent, Severity};
use homefleet::models::host::{OsFamily, Service};
use homefleet::models::result::ErrorKind;
use tokio_test::{assert_err, assert_ok};

use crate::support::{host, Fixture, MockInstaller, MockTransport};

#[tokio::test]
async fn test_one_result_per_host_in_submission_order() {
    let fixture = Fixture::default();
    let deployer = fixture.deployer(Arc::new(MockTransport::new()), 4);
    let hosts: Vec<_> = (1..=5)
        .map(|id| host(id, &format!("10.0.0.{}", id), Some(Service::Dashy)))
        .collect();

    let mut run = assert_ok!(deployer.submit(hosts));
    let mut events: Vec<PipelineEvent> = Vec::new();
    let summary = run.wait(&mut events).await;

    assert_eq!(summary.total(), 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);
    let ids: Vec<u64> = summary.per_host.iter().map(|r| r.host_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(summary
        .per_host
        .iter()
        .all(|r| r.service == Some(Service::Dashy)));
    assert!(!deployer.is_busy());
}

#[tokio::test]
async fn test_mixed_fleet_summary() {
    let fixture = Fixture {
        compat: Arc::new(MockInstaller::ok("WSL").outcome_on(
            "10.0.0.3",
            InstallOutcome::Structured {
                success: true,
                needs_reboot: true,
                ready: false,
            },
        )),
        ..Fixture::default()
    };
    let transport = MockTransport::new()
        .unreachable("10.0.0.2")
        .with_os("10.0.0.3", OsFamily::Windows);
    let deployer = fixture.deployer(Arc::new(transport), 8);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::N8n)),
        host(2, "10.0.0.2", Some(Service::PiHole)),
        host(3, "10.0.0.3", Some(Service::Portainer)),
    ];
    let mut run = assert_ok!(deployer.submit(hosts));
    let summary = run.wait(&mut Vec::new()).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
    assert!(summary.get(1).map(|r| r.success).unwrap_or(false));
    assert_eq!(
        summary.get(2).and_then(|r| r.error_kind),
        Some(ErrorKind::ConnectionFailed)
    );
    assert_eq!(
        summary.get(3).and_then(|r| r.error_kind),
        Some(ErrorKind::RebootRequired)
    );

    let report = summary.to_report_text();
    assert!(report.contains("connection failed"));
    assert!(report.contains("reboot required"));
    // later stages never ran for the failed hosts
    assert_eq!(fixture.service.calls().len(), 1);
}

#[tokio::test]
async fn test_proxy_failure_is_soft() {
    let fixture = Fixture {
        proxy: Arc::new(MockInstaller::failing("reverse proxy")),
        ..Fixture::default()
    };
    let deployer = fixture.deployer(Arc::new(MockTransport::new()), 2);

    let mut run = assert_ok!(deployer.submit(vec![host(1, "nas.lan", Some(Service::Homarr))]));
    let mut events: Vec<PipelineEvent> = Vec::new();
    let summary = run.wait(&mut events).await;

    assert_eq!(summary.succeeded, 1);
    assert!(events
        .iter()
        .any(|e| e.severity == Severity::Warning && e.message.contains("unavailable")));
    assert!(!events.iter().any(|e| e.severity == Severity::Error));
    assert_eq!(fixture.service.calls(), vec![("nas.lan".to_string(), false)]);
}

#[tokio::test]
async fn test_service_sees_proxy_when_it_is_up() {
    let fixture = Fixture::default();
    let deployer = fixture.deployer(Arc::new(MockTransport::new()), 2);

    let mut run = assert_ok!(deployer.submit(vec![host(1, "nas.lan", Some(Service::Homarr))]));
    run.wait(&mut Vec::new()).await;
    assert_eq!(fixture.service.calls(), vec![("nas.lan".to_string(), true)]);
}

#[tokio::test]
async fn test_runtime_failure_kind_depends_on_os() {
    let fixture = Fixture {
        runtime: Arc::new(MockInstaller::failing("docker")),
        ..Fixture::default()
    };
    let transport = MockTransport::new().with_os("10.0.0.2", OsFamily::Windows);
    let deployer = fixture.deployer(Arc::new(transport), 2);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::Crafty)),
        host(2, "10.0.0.2", Some(Service::Crafty)),
    ];
    let mut run = assert_ok!(deployer.submit(hosts));
    let summary = run.wait(&mut Vec::new()).await;

    assert_eq!(
        summary.get(1).and_then(|r| r.error_kind),
        Some(ErrorKind::RuntimeInstallFailed)
    );
    assert_eq!(
        summary.get(2).and_then(|r| r.error_kind),
        Some(ErrorKind::CompatRuntimeFailed)
    );
}

#[tokio::test]
async fn test_unknown_service_and_unknown_os() {
    let fixture = Fixture::default();
    let transport = MockTransport::new().with_os("10.0.0.2", OsFamily::Unknown);
    let deployer = fixture.deployer(Arc::new(transport), 2);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::parse("jellyfin"))),
        host(2, "10.0.0.2", Some(Service::Dashy)),
    ];
    let mut run = assert_ok!(deployer.submit(hosts));
    let summary = run.wait(&mut Vec::new()).await;

    assert_eq!(
        summary.get(1).and_then(|r| r.error_kind),
        Some(ErrorKind::UnknownService)
    );
    assert_eq!(
        summary.get(2).and_then(|r| r.error_kind),
        Some(ErrorKind::UnknownOs)
    );
    assert!(fixture.service.calls().is_empty());
    assert!(fixture.runtime.calls().iter().all(|(a, _)| a == "10.0.0.1"));
}

#[tokio::test]
async fn test_panicking_worker_is_isolated() {
    let fixture = Fixture::default();
    let transport = MockTransport::new().panics_on("10.0.0.2");
    let deployer = fixture.deployer(Arc::new(transport), 4);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::AdGuard)),
        host(2, "10.0.0.2", Some(Service::AdGuard)),
        host(3, "10.0.0.3", Some(Service::AdGuard)),
    ];
    let mut run = assert_ok!(deployer.submit(hosts));
    let summary = run.wait(&mut Vec::new()).await;

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(
        summary.get(2).and_then(|r| r.error_kind),
        Some(ErrorKind::WorkerLost)
    );
}

#[tokio::test]
async fn test_concurrency_is_capped() {
    let fixture = Fixture::default();
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(30)));
    let deployer = fixture.deployer(transport.clone(), 2);

    let hosts: Vec<_> = (1..=6)
        .map(|id| host(id, &format!("10.0.1.{}", id), Some(Service::N8n)))
        .collect();
    let mut run = assert_ok!(deployer.submit(hosts));
    let summary = run.wait(&mut Vec::new()).await;

    assert_eq!(summary.succeeded, 6);
    assert_eq!(transport.connects(), 6);
    assert!(transport.peak() <= 2, "peak was {}", transport.peak());
}

#[tokio::test]
async fn test_validation_gate_blocks_the_whole_run() {
    let fixture = Fixture::default();
    let transport = Arc::new(MockTransport::new());
    let deployer = fixture.deployer(transport.clone(), 4);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::Dashy)),
        host(2, "256.1.1.1", Some(Service::Dashy)),
        host(3, "10.0.0.3", None),
    ];
    match deployer.submit(hosts) {
        Err(FleetError::ValidationFailed(issues)) => {
            let ids: Vec<u64> = issues.iter().map(|i| i.host_id).collect();
            assert_eq!(ids, vec![2, 3]);
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("invalid hosts were accepted"),
    }
    assert_eq!(transport.connects(), 0);
    assert!(!deployer.is_busy());
}

#[tokio::test]
async fn test_second_deployment_is_rejected_while_active() {
    let fixture = Fixture::default();
    let transport = MockTransport::new().with_delay(Duration::from_millis(100));
    let deployer = fixture.deployer(Arc::new(transport), 4);

    let mut first = assert_ok!(deployer.submit(vec![host(1, "10.0.0.1", Some(Service::Dashy))]));
    assert!(deployer.is_busy());

    let second = deployer.submit(vec![host(2, "10.0.0.2", Some(Service::Dashy))]);
    assert!(matches!(second, Err(FleetError::RunInProgress(_))));

    let summary = first.wait(&mut Vec::new()).await;
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.per_host[0].host_id, 1);

    let mut third = assert_ok!(deployer.submit(vec![host(3, "10.0.0.3", Some(Service::Dashy))]));
    third.wait(&mut Vec::new()).await;
}

#[tokio::test]
async fn test_drain_after_completion_is_empty() {
    let fixture = Fixture::default();
    let deployer = fixture.deployer(Arc::new(MockTransport::new()), 4);
    let mut run = assert_ok!(deployer.submit(vec![host(1, "10.0.0.1", Some(Service::Dashy))]));

    while !run.is_complete() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let first = run.try_drain_events();
    assert!(!first.is_empty());
    assert!(first.iter().all(|e| e.host_id == 1));
    assert!(run.try_drain_events().is_empty());

    let summary = run.collect_summary();
    assert_eq!(summary.map(|s| s.succeeded), Some(1));
    assert!(run.try_drain_events().is_empty());
    assert!(!deployer.is_busy());
}

#[test]
fn test_blank_address_is_rejected() {
    let fixture = Fixture::default();
    let deployer = fixture.deployer(Arc::new(MockTransport::new()), 4);
    let issues = assert_err!(deployer
        .submit(vec![host(1, "", Some(Service::Dashy))])
        .map(|run| run.id()));
    assert!(matches!(issues, FleetError::ValidationFailed(ref list) if list.len() == 1));
}

#[tokio::test]
async fn test_dropped_run_keeps_the_slot_until_its_workers_finish() {
    let fixture = Fixture::default();
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(200)));
    let deployer = fixture.deployer(transport.clone(), 4);

    let run = assert_ok!(deployer.submit(vec![host(1, "10.0.0.1", Some(Service::Dashy))]));
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(run);

    let again = deployer.submit(vec![host(1, "10.0.0.1", Some(Service::Dashy))]);
    assert!(matches!(again, Err(FleetError::RunInProgress(_))));
    assert!(deployer.is_busy());

    while deployer.is_busy() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut next = assert_ok!(deployer.submit(vec![host(1, "10.0.0.1", Some(Service::Dashy))]));
    next.wait(&mut Vec::new()).await;
    assert_eq!(transport.peak(), 1);
    assert_eq!(transport.connects(), 2);
}

#[tokio::test]
async fn test_unreachable_linux_and_rebooting_windows_hosts() {
    let fixture = Fixture {
        compat: Arc::new(MockInstaller::ok("WSL").outcome_on(
            "10.0.0.3",
            InstallOutcome::Structured {
                success: true,
                needs_reboot: true,
                ready: false,
            },
        )),
        ..Fixture::default()
    };
    let transport = MockTransport::new()
        .unreachable("10.0.0.1")
        .with_os("10.0.0.3", OsFamily::Windows);
    let deployer = fixture.deployer(Arc::new(transport), 8);

    let hosts = vec![
        host(1, "10.0.0.1", Some(Service::AdGuard)),
        host(2, "10.0.0.2", Some(Service::AdGuard)),
        host(3, "10.0.0.3", Some(Service::AdGuard)),
    ];
    let mut run = assert_ok!(deployer.submit(hosts));
    let mut events: Vec<PipelineEvent> = Vec::new();
    let summary = run.wait(&mut events).await;

    assert_eq!((summary.succeeded, summary.failed), (1, 2));
    let ids: Vec<u64> = summary.per_host.iter().map(|r| r.host_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(
        summary.get(1).and_then(|r| r.error_kind),
        Some(ErrorKind::ConnectionFailed)
    );
    let linux = summary.get(2).unwrap();
    assert!(linux.success);
    assert_eq!(linux.service, Some(Service::AdGuard));
    assert_eq!(
        summary.get(3).and_then(|r| r.error_kind),
        Some(ErrorKind::RebootRequired)
    );

    // host 1 never got past the connection test
    assert!(events
        .iter()
        .filter(|e| e.host_id == 1)
        .all(|e| !e.message.contains("Installing")));
    assert_eq!(fixture.service.calls(), vec![("10.0.0.2".to_string(), true)]);
}
