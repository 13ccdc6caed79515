//! Stage FSM tests

use homefleet::deploy::fsm::{Stage, StageEvent, StageFsm};
use homefleet::models::host::OsFamily;
use homefleet::models::result::ErrorKind;

fn at_runtime(os: OsFamily) -> StageFsm {
    let mut fsm = StageFsm::new();
    fsm.process(StageEvent::Start).unwrap();
    fsm.process(StageEvent::Connected).unwrap();
    fsm.process(StageEvent::OsDetected(os)).unwrap();
    if os == OsFamily::Windows {
        fsm.process(StageEvent::CompatReady).unwrap();
    }
    fsm
}

#[test]
fn test_fsm_initial_state() {
    let fsm = StageFsm::new();
    assert_eq!(fsm.stage(), Stage::Pending);
    assert_eq!(fsm.os(), None);
    assert!(!fsm.proxy_available());
}

#[test]
fn test_fsm_windows_success_flow() {
    let mut fsm = at_runtime(OsFamily::Windows);
    assert_eq!(fsm.stage(), Stage::Runtime);
    fsm.process(StageEvent::RuntimeReady).unwrap();
    fsm.process(StageEvent::ProxyDone(true)).unwrap();
    assert!(fsm.proxy_available());
    assert_eq!(fsm.process(StageEvent::ServiceInstalled).unwrap(), Stage::Succeeded);
}

#[test]
fn test_fsm_connection_failure_is_terminal() {
    let mut fsm = StageFsm::new();
    fsm.process(StageEvent::Start).unwrap();
    assert_eq!(
        fsm.process(StageEvent::Fail(ErrorKind::ConnectionFailed)).unwrap(),
        Stage::Failed(ErrorKind::ConnectionFailed)
    );
    assert!(fsm.stage().is_terminal());
    assert!(fsm.process(StageEvent::Connected).is_err());
    assert_eq!(fsm.stage(), Stage::Failed(ErrorKind::ConnectionFailed));
}

#[test]
fn test_fsm_rejects_failures_from_other_stages() {
    let mut fsm = at_runtime(OsFamily::Linux);
    assert!(fsm.process(StageEvent::Fail(ErrorKind::RebootRequired)).is_err());
    assert!(fsm.process(StageEvent::Fail(ErrorKind::CompatRuntimeFailed)).is_err());
    assert_eq!(fsm.stage(), Stage::Runtime);
    assert_eq!(
        fsm.process(StageEvent::Fail(ErrorKind::RuntimeInstallFailed)).unwrap(),
        Stage::Failed(ErrorKind::RuntimeInstallFailed)
    );
}

#[test]
fn test_fsm_proxy_failure_continues_to_service() {
    let mut fsm = at_runtime(OsFamily::Linux);
    fsm.process(StageEvent::RuntimeReady).unwrap();
    assert_eq!(fsm.process(StageEvent::ProxyDone(false)).unwrap(), Stage::Service);
    assert_eq!(
        fsm.process(StageEvent::Fail(ErrorKind::UnknownService)).unwrap(),
        Stage::Failed(ErrorKind::UnknownService)
    );
}

#[test]
fn test_fsm_skipping_stages_is_invalid() {
    let mut fsm = StageFsm::new();
    assert!(fsm.process(StageEvent::ServiceInstalled).is_err());
    assert!(fsm.process(StageEvent::Connected).is_err());
    assert_eq!(fsm.stage(), Stage::Pending);
}
