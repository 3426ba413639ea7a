mod common;

use common::*;
use platform_backup::config::{PipelineConfig, ReleaseVersion, StopPolicy};
use platform_backup::tile::{ElasticRuntime, Tile};
use platform_backup::transport::HttpGateway;
use platform_backup::BackupError;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(stop_policy: StopPolicy) -> PipelineConfig {
    PipelineConfig {
        release: Some(ReleaseVersion::Default),
        stop_policy,
        task_poll_interval_secs: 0,
        task_poll_attempts: 2,
        ..PipelineConfig::default()
    }
}

struct Harness {
    dir: TempDir,
    events: EventLog,
    gateway: Arc<MockGateway>,
}

impl Harness {
    fn new(settings: serde_json::Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_installation(dir.path(), &settings);
        let events = event_log();
        let gateway = Arc::new(MockGateway::healthy_director(events.clone()));
        Self { dir, events, gateway }
    }

    fn target(&self) -> &Path {
        self.dir.path()
    }

    fn runtime(&self, factory: FaultyFactory, config: PipelineConfig) -> ElasticRuntime {
        let gateway: Arc<dyn HttpGateway> = self.gateway.clone();
        ElasticRuntime::new(
            self.target().join("installation.json"),
            self.target(),
            gateway,
            Box::new(factory),
            config,
        )
    }

    fn events_matching(&self, needle: &str) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.contains(needle))
            .cloned()
            .collect()
    }
}

#[test]
fn test_backup_writes_one_file_per_component() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap();

    assert_eq!(
        std::fs::read(harness.target().join("ccdb.backup")).unwrap(),
        b"partial dump of ccdb"
    );
    assert_eq!(
        std::fs::read(harness.target().join("mysql.backup")).unwrap(),
        b"partial dump of mysql"
    );
    assert_eq!(stats.borrow().built, vec!["ccdb", "mysql"]);
}

#[test]
fn test_cloud_controllers_stopped_around_dumps() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    let factory = FaultyFactory::new(harness.events.clone());

    harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap();

    let sequence: Vec<String> = harness
        .events
        .borrow()
        .iter()
        .filter(|event| event.starts_with("PUT") || event.starts_with("dump"))
        .map(|event| match event.split_once("/jobs/") {
            Some((_, job)) => job.to_string(),
            None => event.clone(),
        })
        .collect();

    assert_eq!(
        sequence,
        vec![
            "cloud_controller-partition/0?state=stopped",
            "cloud_controller_worker-partition/0?state=stopped",
            "dump ccdb",
            "dump mysql",
            "cloud_controller-partition/0?state=started",
            "cloud_controller_worker-partition/0?state=started",
        ]
    );
}

#[test]
fn test_empty_component_list_makes_no_remote_calls() {
    let jobs = vec![job("router", "10.0.0.9", &[("vcap", "rpass")])];
    let harness = Harness::new(installation("microbosh", jobs));
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .restore()
        .unwrap_err();

    assert!(matches!(err, BackupError::EmptyPersistenceList));
    assert!(harness.events.borrow().is_empty());
    assert!(stats.borrow().built.is_empty());
}

#[test]
fn test_rejected_director_credentials_touch_no_database() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    harness.gateway.route(&format!("{DIRECTOR}/info"), 401, "Not authorized");
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap_err();

    assert!(matches!(err, BackupError::DirectorCredentialsInvalid));
    assert!(stats.borrow().built.is_empty());
    assert!(harness.events_matching("PUT").is_empty());
}

#[test]
fn test_failed_dump_is_classified_and_cleaned_up() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    let mut factory = FaultyFactory::new(harness.events.clone());
    factory.fail_dump = Some("ccdb");
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap_err();

    assert!(matches!(err, BackupError::DatabaseAction { ref component } if component == "ccdb"));
    assert!(!harness.target().join("ccdb.backup").exists());
    // later components are not attempted
    assert_eq!(stats.borrow().built, vec!["ccdb"]);
    assert!(!harness.target().join("mysql.backup").exists());

    // dependents restarted exactly once each
    assert_eq!(harness.events_matching("state=stopped").len(), 2);
    assert_eq!(harness.events_matching("state=started").len(), 2);
}

#[test]
fn test_restore_imports_backup_files() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    std::fs::write(harness.target().join("ccdb.backup"), b"ccdb archive").unwrap();
    std::fs::write(harness.target().join("mysql.backup"), b"mysql archive").unwrap();
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .restore()
        .unwrap();

    let stats = stats.borrow();
    assert_eq!(stats.imported["ccdb"], b"ccdb archive");
    assert_eq!(stats.imported["mysql"], b"mysql archive");
    assert_eq!(harness.events_matching("state=started").len(), 2);
}

#[test]
fn test_restore_with_missing_backup_file_fails() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    std::fs::write(harness.target().join("mysql.backup"), b"mysql archive").unwrap();
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .restore()
        .unwrap_err();

    assert!(matches!(err, BackupError::DatabaseAction { ref component } if component == "ccdb"));
    assert!(stats.borrow().imported.is_empty());
    assert_eq!(harness.events_matching("state=started").len(), 2);
}

#[test]
fn test_failed_import_is_classified() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    std::fs::write(harness.target().join("ccdb.backup"), b"ccdb archive").unwrap();
    std::fs::write(harness.target().join("mysql.backup"), b"mysql archive").unwrap();
    let mut factory = FaultyFactory::new(harness.events.clone());
    factory.fail_import = Some("mysql");

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .restore()
        .unwrap_err();

    assert!(matches!(err, BackupError::DatabaseAction { ref component } if component == "mysql"));
}

#[test]
fn test_invalid_component_is_skipped() {
    // mysql has no system account credential
    let jobs = vec![
        job("ccdb", "10.0.0.5", &[("admin", "ccpass"), ("vcap", "ccvpass")]),
        job("mysql", "10.0.0.6", &[("root", "mypass")]),
    ];
    let harness = Harness::new(installation("microbosh", jobs));
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap();

    assert_eq!(stats.borrow().built, vec!["ccdb"]);
    assert!(harness.target().join("ccdb.backup").exists());
    assert!(!harness.target().join("mysql.backup").exists());
}

#[test]
fn test_all_components_invalid_is_empty_list() {
    let jobs = vec![job("mysql", "10.0.0.6", &[("root", "mypass")])];
    let harness = Harness::new(installation("microbosh", jobs));
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap_err();

    assert!(matches!(err, BackupError::EmptyPersistenceList));
    assert!(stats.borrow().built.is_empty());
    assert!(harness.events.borrow().is_empty());
}

#[test]
fn test_unresolvable_components_fail_restore_before_director() {
    // ccdb has no credential for its admin identity, mysql none for vcap
    let jobs = vec![
        job("ccdb", "10.0.0.5", &[("vcap", "ccvpass")]),
        job("mysql", "10.0.0.6", &[("root", "mypass")]),
    ];
    let harness = Harness::new(installation("microbosh", jobs));
    std::fs::write(harness.target().join("ccdb.backup"), b"ccdb archive").unwrap();
    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();

    let err = harness
        .runtime(factory, config(StopPolicy::Required))
        .restore()
        .unwrap_err();

    assert!(matches!(err, BackupError::EmptyPersistenceList));
    assert!(stats.borrow().imported.is_empty());
    assert!(harness.events_matching(DIRECTOR).is_empty());
}

#[test]
fn test_vm_listing_failure_depends_on_stop_policy() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    harness
        .gateway
        .route(&format!("{DIRECTOR}/deployments/cf-1/vms"), 500, "director busy");

    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();
    harness
        .runtime(factory, config(StopPolicy::BestEffort))
        .backup()
        .unwrap();
    assert_eq!(stats.borrow().built, vec!["ccdb", "mysql"]);

    let factory = FaultyFactory::new(harness.events.clone());
    let stats = factory.stats.clone();
    let err = harness
        .runtime(factory, config(StopPolicy::Required))
        .backup()
        .unwrap_err();
    assert!(matches!(err, BackupError::HttpStatus { status: 500, .. }));
    assert!(stats.borrow().built.is_empty());
}

#[test]
fn test_director_product_follows_release() {
    let harness = Harness::new(installation("p-bosh", default_runtime_jobs()));

    let err = harness
        .runtime(
            FaultyFactory::new(harness.events.clone()),
            config(StopPolicy::BestEffort),
        )
        .backup()
        .unwrap_err();
    assert!(matches!(err, BackupError::ProductNotFound(ref product) if product == "microbosh"));

    let release_1_6 = PipelineConfig {
        release: Some(ReleaseVersion::V1_6),
        ..config(StopPolicy::BestEffort)
    };
    harness
        .runtime(FaultyFactory::new(harness.events.clone()), release_1_6)
        .backup()
        .unwrap();
}

#[test]
fn test_missing_installation_settings() {
    let harness = Harness::new(installation("microbosh", default_runtime_jobs()));
    std::fs::remove_file(harness.target().join("installation.json")).unwrap();

    let err = harness
        .runtime(
            FaultyFactory::new(harness.events.clone()),
            config(StopPolicy::BestEffort),
        )
        .backup()
        .unwrap_err();
    assert!(matches!(err, BackupError::Io(_)));
}
