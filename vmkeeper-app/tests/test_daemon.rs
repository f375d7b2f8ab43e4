use tempfile::TempDir;
use vmkeeper_app::config::Config;
use vmkeeper_app::daemon::build_supervisor;
use vmkeeper_core::{EventSink, StartupOutcome};

fn config_in(dir: &TempDir, vboxmanage: &str) -> Config {
    let mut config = Config::from_yaml(&format!(
        "ova_path: /images/appliance.ova\nbase_folder: {}\n",
        dir.path().join("vms").display()
    ))
    .unwrap();
    config.vboxmanage = vboxmanage.to_string();
    config.stop_settle_secs = 0;
    config.delete_settle_secs = 0;
    config
}

#[test]
fn test_build_supervisor_rejects_bad_schedule() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "VBoxManage");
    config.schedule_time = "noon".to_string();

    assert!(build_supervisor(&config, EventSink::disabled()).is_err());
}

#[test]
fn test_build_supervisor_uses_configured_schedule() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "VBoxManage");
    config.schedule_time = "21:15".to_string();

    let supervisor = build_supervisor(&config, EventSink::disabled()).unwrap();
    assert_eq!(supervisor.schedule().at().to_string(), "21:15");
    assert_eq!(supervisor.handle(), None);
}

// `true` accepts any arguments and prints nothing, so every listing is empty
// and imports never register anything.
#[cfg(unix)]
#[tokio::test]
async fn test_startup_against_silent_backend_fails_without_panicking() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "true");
    config.state_file = Some(dir.path().join("handle.json"));

    let mut supervisor = build_supervisor(&config, EventSink::disabled()).unwrap();
    let outcome = supervisor.reconcile_startup().await;

    assert!(matches!(outcome, StartupOutcome::Failed(_)));
    assert_eq!(supervisor.handle(), None);
    assert!(dir.path().join("vms").join("VM_1").is_dir());
    assert_eq!(supervisor.metrics().snapshot().imports, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_backend_binary_is_survivable() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "/nonexistent/VBoxManage");

    let mut supervisor = build_supervisor(&config, EventSink::disabled()).unwrap();
    let outcome = supervisor.reconcile_startup().await;

    assert!(matches!(outcome, StartupOutcome::Failed(_)));
    let report = supervisor.tick().await;
    assert_eq!(report.recovered, None);
}
