//! Inventory and settings persistence tests

use std::path::PathBuf;

use homefleet::errors::FleetError;
use homefleet::models::host::Service;
use homefleet::storage::inventory::HostStore;
use homefleet::storage::layout::StorageLayout;
use homefleet::storage::settings::Settings;
use homefleet::workers::refresh::RefreshInterval;
use tokio_test::assert_ok;

fn temp_base() -> PathBuf {
    std::env::temp_dir().join(format!("homefleet-inv-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn test_ids_survive_save_and_load() {
    let base = temp_base();
    let layout = StorageLayout::new(&base);
    let file = layout.hosts_file();

    let store = HostStore::new();
    store.add("10.0.0.1", "pi", "pw", Some(Service::Dashy)).unwrap();
    let second = store.add("10.0.0.2", "pi", "pw", Some(Service::PiHole)).unwrap();
    store.remove(second.id).unwrap();
    assert_ok!(store.save(&file).await);

    let loaded = assert_ok!(HostStore::load(&file).await);
    assert_eq!(loaded.len(), 1);
    let host = loaded.get(1).unwrap();
    assert_eq!(host.service, Some(Service::Dashy));
    assert!(host.has_secret());

    // a removed id is never handed out again, even after a reload
    let next = loaded.add("10.0.0.3", "pi", "pw", None).unwrap();
    assert_eq!(next.id, 3);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn test_missing_files_mean_defaults() {
    let layout = StorageLayout::new(temp_base());

    let store = assert_ok!(HostStore::load(&layout.hosts_file()).await);
    assert!(store.is_empty());

    let settings = assert_ok!(Settings::load(&layout.settings_file()).await);
    assert_eq!(settings.max_concurrency, 32);
    assert_eq!(settings.health.auto_refresh, None);
}

#[tokio::test]
async fn test_settings_round_trip_and_validation() {
    let base = temp_base();
    let layout = StorageLayout::new(&base);
    assert_ok!(layout.setup().await);
    let file = layout.settings_file();

    let mut settings = Settings::default();
    settings.health.auto_refresh = Some(RefreshInterval::OneMinute);
    settings.proxy.domain = Some("home.arpa".to_string());
    assert_ok!(settings.save(&file).await);

    let loaded = assert_ok!(Settings::load(&file).await);
    assert_eq!(loaded.health.auto_refresh, Some(RefreshInterval::OneMinute));
    assert_eq!(loaded.proxy.domain.as_deref(), Some("home.arpa"));

    file.write_string(r#"{"max_concurrency": 0}"#).await.unwrap();
    assert!(matches!(
        Settings::load(&file).await,
        Err(FleetError::ConfigError(_))
    ));

    let _ = std::fs::remove_dir_all(base);
}
