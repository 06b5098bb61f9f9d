use std::fs;
use std::sync::Arc;

use gsync_core::FleetConfig;
use gsync_orchestrator::{Orchestrator, ProfileConfig, SyncStatus};
use gsync_runtime::mock::{MockCompose, MockContainer, MockRuntime};
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<MockRuntime>, Orchestrator) {
    let temp = TempDir::new().unwrap();
    let fleet = FleetConfig::for_workspace(temp.path());
    let runtime = Arc::new(MockRuntime::new());
    let compose = Arc::new(MockCompose::new(runtime.clone(), &fleet.container_prefix));
    let orchestrator = Orchestrator::new(fleet, runtime.clone(), compose);
    (temp, runtime, orchestrator)
}

#[test]
fn available_profiles_exclude_running_ones() {
    let (_temp, runtime, orchestrator) = setup();
    orchestrator.create_profile("alpha", Some("Zeta family")).unwrap();
    orchestrator.create_profile("beta", Some("Beta")).unwrap();
    orchestrator.create_profile("gamma", Some("Alpha family")).unwrap();
    orchestrator
        .save_config("gamma", &ProfileConfig::default())
        .unwrap();
    runtime.add_container(MockContainer::new("gphotos-sync-beta", true));
    // stopped containers do not hide their profile
    runtime.add_container(MockContainer::new("gphotos-sync-alpha", false));

    let available = orchestrator.list_available().unwrap();
    let names: Vec<&str> = available.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["gamma", "alpha"]);
    assert!(available[0].has_compose);
    assert!(!available[1].has_compose);
}

#[test]
fn observations_are_derived_from_the_live_container() {
    let (_temp, runtime, orchestrator) = setup();
    orchestrator.create_profile("alpha", Some("Alpha")).unwrap();
    runtime.add_container(
        MockContainer::new("gphotos-sync-alpha", true).with_env(&[
            "TZ=UTC",
            "CRON_SCHEDULE=0 3 * * *",
            "RUN_ON_STARTUP=false",
            "WORKER_COUNT=4",
            "HEALTHCHECK_HOST=https://hc-ping.com",
            "HEALTHCHECK_ID=abc",
            "SOMETHING_ELSE=1",
        ]),
    );
    runtime.set_logs(
        "gphotos-sync-alpha",
        "2024-01-01T03:00:00Z starting\n2024-01-01T03:00:01Z Downloading 12 items",
    );

    let observed = orchestrator.list_running().unwrap();
    assert_eq!(observed.len(), 1);
    let alpha = &observed[0];
    assert_eq!(alpha.profile, "alpha");
    assert_eq!(alpha.display_name, "Alpha");
    assert_eq!(alpha.id.len(), 12);
    assert_eq!(alpha.config.cron_schedule, "0 3 * * *");
    assert_eq!(alpha.config.worker_count, 4);
    assert!(!alpha.config.run_on_startup);
    assert_eq!(alpha.config.healthcheck_url, "https://hc-ping.com/abc");
    assert_eq!(alpha.sync_status, SyncStatus::Syncing);
    assert_ne!(alpha.next_run, "N/A");
    assert!(alpha.time_until.ends_with('m'));
}

#[test]
fn unmanaged_and_stopped_containers_are_reported() {
    let (_temp, runtime, orchestrator) = setup();
    runtime.add_container(MockContainer::new("gphotos-sync", true));
    runtime.add_container(
        MockContainer::new("gphotos-sync-beta", false)
            .with_command(&["/app/sync.sh", "--once"]),
    );
    runtime.add_container(MockContainer::new("unrelated", true));
    runtime.set_logs("gphotos-sync", "SYNC COMPLETED");

    let observed = orchestrator.list_running().unwrap();
    assert_eq!(observed.len(), 2);

    let default = observed.iter().find(|o| o.name == "gphotos-sync").unwrap();
    assert_eq!(default.profile, "default");
    assert_eq!(default.sync_status, SyncStatus::Completed);

    let beta = observed.iter().find(|o| o.profile == "beta").unwrap();
    assert_eq!(beta.sync_status, SyncStatus::Stopped);
    assert_eq!(beta.config.cron_schedule, "disabled");
    assert_eq!(beta.next_run, "Disabled");
}

#[test]
fn log_failures_yield_unknown_status() {
    let (_temp, runtime, orchestrator) = setup();
    runtime.add_container(MockContainer::new("gphotos-sync-alpha", true));
    runtime.fail("logs:gphotos-sync-alpha", "daemon hiccup");

    let observed = orchestrator.list_running().unwrap();
    assert_eq!(observed[0].sync_status, SyncStatus::Unknown);
}

#[test]
fn stats_count_running_and_stopped() {
    let (_temp, runtime, orchestrator) = setup();
    runtime.add_container(MockContainer::new("gphotos-sync-alpha", true));
    runtime.add_container(MockContainer::new("gphotos-sync-beta", false));
    runtime.add_container(MockContainer::new("gphotos-sync-gamma", false));

    let stats = orchestrator.container_stats().unwrap();
    assert_eq!((stats.total, stats.running, stats.stopped), (3, 1, 2));
}

#[test]
fn direct_container_control() {
    let (_temp, runtime, orchestrator) = setup();
    runtime.add_container(MockContainer::new("gphotos-sync-alpha", false));

    orchestrator.start_container("gphotos-sync-alpha").unwrap();
    assert!(runtime.container("gphotos-sync-alpha").unwrap().running);
    orchestrator.stop_container("gphotos-sync-alpha").unwrap();
    assert!(!runtime.container("gphotos-sync-alpha").unwrap().running);
    orchestrator.restart_container("gphotos-sync-alpha").unwrap();
    assert!(runtime.container("gphotos-sync-alpha").unwrap().running);

    assert!(orchestrator.start_container("ghost").unwrap_err().is_not_found());
}

#[test]
fn browse_stays_inside_the_mount_root() {
    let (temp, _runtime, orchestrator) = setup();
    let mount = &orchestrator.fleet().host_mount_root;
    fs::create_dir_all(mount.join("media/photos")).unwrap();
    fs::write(temp.path().join("secret.txt"), "outside").unwrap();

    for path in ["/../../", "/media/../../..", "../host/../.."] {
        let listing = orchestrator.browse(path).unwrap();
        assert_eq!(listing.path, "/");
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["media"], "input {path}");
        assert_eq!(listing.files_count, 0);
    }
}
