//! Tests for the 'run' command
//!
//! A run drives every stage through the mocked executor; nothing leaves the
//! temp dir.

use offsite_backup::managers::backup::BackupManager;
use offsite_backup::stages::dump::{DatabaseDump, DirectDump};
use std::time::Duration;
use test_utils::{
    mysql_listing, sample_stamp, CleanupPolicy, ConfigBuilder, MockExecutor, MockResponse,
    RecordingNotifier, Stage, StageOutcome, TestContext,
};

const STAMP: &str = "2024-01-12_08-30-00";

fn manager(
    ctx: &TestContext,
    executor: &MockExecutor,
    notifier: &RecordingNotifier,
) -> BackupManager<MockExecutor, RecordingNotifier> {
    BackupManager::new(ctx.run_config(), executor.clone(), notifier.clone(), &ctx.lock_dir())
}

fn three_databases_second_failing() -> MockExecutor {
    MockExecutor::new()
        .expect("mysql", MockResponse::stdout(&mysql_listing(&["alpha", "beta", "gamma"])))
        .expect("mysqldump", MockResponse::stdout("-- dump"))
        .expect_when("mysqldump", "beta", MockResponse::failure(2, "Access denied"))
}

#[test]
fn test_dump_failure_does_not_stop_the_run() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_direct_database(&[]));
    let executor = three_databases_second_failing();
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert_eq!(executor.call_count("mysqldump"), 3);
    match report.outcome(Stage::DumpDatabases) {
        Some(StageOutcome::Recovered { cause }) => {
            assert!(cause.contains("beta"));
            assert!(!cause.contains("alpha"));
        }
        other => panic!("unexpected dump outcome: {:?}", other),
    }
    assert_eq!(report.outcome(Stage::Archive), Some(&StageOutcome::Succeeded));
    assert_eq!(report.outcome(Stage::Transfer), Some(&StageOutcome::Succeeded));
    assert_eq!(executor.call_count("scp"), 2);

    // the sql folder is archived ahead of the configured directories
    let tar = &executor.calls_to("tar")[0];
    let sql_dir = ctx.run_config().sql_dir.display().to_string();
    let site = ctx.temp_dir().join("site").display().to_string();
    let sql_pos = tar.args.iter().position(|a| *a == sql_dir).unwrap();
    let site_pos = tar.args.iter().position(|a| *a == site).unwrap();
    assert!(sql_pos < site_pos);
}

#[test]
fn test_dump_files_for_the_others_are_written() {
    let ctx = TestContext::new();
    let sql_dir = ctx.create_subdir("mysql");
    let executor = three_databases_second_failing();

    let dumper = DirectDump::new(&executor, "root", "pw", &[], Duration::from_secs(60));
    let report = dumper.dump_all(&sql_dir, &sample_stamp()).unwrap();

    assert_eq!(report.dumped.len(), 2);
    assert_eq!(report.failed[0].database, "beta");
    assert_eq!(
        ctx.list_dir("mysql"),
        vec![format!("alpha_{}.sql", STAMP), format!("gamma_{}.sql", STAMP)]
    );
}

#[test]
fn test_run_artifacts_are_named_consistently() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().server("edge1"));
    // remote run directory does not exist yet
    let executor = MockExecutor::new().expect_when("ssh", "test -d", MockResponse::failure(1, ""));
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();
    assert!(report.is_clean());

    let run_dir = format!("backup_edge1_{}", STAMP);
    let archive = format!("backup_all_directories_{}.tar.gz", STAMP);
    let remote_dir = format!("/media/backups/edge1/{}", run_dir);

    let tar = &executor.calls_to("tar")[0];
    assert!(tar.mentions(&format!("files_to/{}/{}", run_dir, archive)));
    assert!(tar.output_file.as_deref().unwrap().contains(&run_dir));

    let ssh = executor.calls_to("ssh");
    assert!(ssh.iter().any(|c| c.mentions(&format!("mkdir -p '{}'", remote_dir))));

    let scp = executor.calls_to("scp");
    assert_eq!(scp.len(), 2);
    assert!(scp[0].mentions(&archive));
    assert!(scp[1].mentions(&format!("tar_backup_log_{}.txt", STAMP)));
    assert!(scp
        .iter()
        .all(|c| c.mentions(&format!("backup@backup.example.net:{}/", remote_dir))));
}

#[test]
fn test_rejected_credentials_still_clear_local_dirs() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal());
    let executor = MockExecutor::new().expect(
        "sshpass",
        MockResponse::failure(5, "Permission denied, please try again."),
    );
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    match report.outcome(Stage::Transfer) {
        Some(StageOutcome::Recovered { cause }) => assert!(cause.contains("authentication")),
        other => panic!("unexpected transfer outcome: {:?}", other),
    }
    assert_eq!(report.outcome(Stage::ClearLocalDirs), Some(&StageOutcome::Succeeded));
    assert!(!executor.was_called("scp"));
    assert!(ctx.list_dir("work/files_to").is_empty());
    assert_eq!(notifier.messages().len(), 2);
}

#[test]
fn test_kept_artifacts_after_failed_transfer() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().cleanup(CleanupPolicy::OnTransferSuccess));
    let executor = MockExecutor::new().expect("scp", MockResponse::failure(1, "No space left on device"));
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert!(matches!(report.outcome(Stage::Transfer), Some(StageOutcome::Recovered { .. })));
    assert!(matches!(report.outcome(Stage::ClearLocalDirs), Some(StageOutcome::Skipped { .. })));
    assert_eq!(ctx.list_dir("work/files_to"), vec![format!("backup_test-server_{}", STAMP)]);
}

#[test]
fn test_content_management_run_covers_every_stage() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_content_management());
    let executor = MockExecutor::new();
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert_eq!(
        report.stage_order(),
        vec![
            Stage::NotifyStart,
            Stage::MaintenanceOn,
            Stage::DumpDatabases,
            Stage::Archive,
            Stage::Transfer,
            Stage::PruneRemote,
            Stage::ClearLocalDirs,
            Stage::MirrorSync,
            Stage::MaintenanceOff,
            Stage::NotifyComplete,
        ]
    );
    assert_eq!(report.outcome(Stage::MirrorSync), Some(&StageOutcome::Succeeded));

    let sudo = executor.calls_to("sudo");
    assert_eq!(sudo.len(), 2);
    assert!(sudo[0].mentions("--on"));
    assert!(sudo[1].mentions("--off"));

    let rsync = &executor.calls_to("rsync")[0];
    assert!(rsync.mentions("--bwlimit=150m"));
    assert!(rsync.mentions(&format!(
        "/media/backups/test-server/backup_test-server_{}/nextcloud/",
        STAMP
    )));
}

#[test]
fn test_mirror_failure_is_recovered() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_content_management());
    let executor = MockExecutor::new().expect("rsync", MockResponse::failure(23, "partial transfer"));
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert!(matches!(report.outcome(Stage::MirrorSync), Some(StageOutcome::Recovered { .. })));
    assert_eq!(report.outcome(Stage::MaintenanceOff), Some(&StageOutcome::Succeeded));
    assert_eq!(executor.call_count("rsync"), 1);
}

#[test]
fn test_prune_after_transfer_removes_older_runs() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().server("edge1").prune_after_transfer(1));
    let current = format!("backup_edge1_{}", STAMP);
    let listing = format!(
        "backup_edge1_2024-01-10_00-00-00\n{}\nbackup_edge1_2024-01-11_00-00-00\nnotes\n",
        current
    );
    let executor = MockExecutor::new()
        .expect_when("ssh", "find -L '/media/backups' ", MockResponse::stdout("edge1\nother\n"))
        .expect_when("ssh", "find -L '/media/backups/edge1' ", MockResponse::stdout(&listing));
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert_eq!(report.outcome(Stage::PruneRemote), Some(&StageOutcome::Succeeded));
    let removed: Vec<_> = executor
        .calls_to("ssh")
        .into_iter()
        .filter(|c| c.mentions("rm -rf"))
        .collect();
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().all(|c| !c.mentions(&current)));
    assert!(!removed.iter().any(|c| c.mentions("notes")));
}

#[test]
fn test_prune_is_skipped_when_transfer_failed() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().prune_after_transfer(1));
    let executor = MockExecutor::new().expect("sshpass", MockResponse::failure(255, "Connection refused"));
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert!(matches!(report.outcome(Stage::PruneRemote), Some(StageOutcome::Skipped { .. })));
    assert!(!executor.was_called("ssh"));
}

#[test]
fn test_container_databases_are_dumped_in_their_containers() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().with_container_databases(&[("shop-db", "shop"), ("wiki-db", "wiki")]),
    );
    let executor = MockExecutor::new();
    let notifier = RecordingNotifier::new();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    assert_eq!(report.outcome(Stage::DumpDatabases), Some(&StageOutcome::Succeeded));
    let docker = executor.calls_to("docker");
    assert_eq!(docker.len(), 2);
    assert!(docker[0].mentions("shop-db"));
    assert_eq!(docker[0].command.get_env("MYSQL_PWD"), Some("apppass"));
    assert!(!docker[0].args.iter().any(|a| a == "apppass"));
}

#[test]
fn test_notifications_bracket_the_run() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().server("edge1"));
    let executor = MockExecutor::new();
    let notifier = RecordingNotifier::new();

    manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].ends_with("Backing Service for edge1 has started"));
    assert!(messages[1].ends_with("Backing Service for edge1 has completed"));
}

#[test]
fn test_notification_problems_never_change_the_run() {
    let ctx = TestContext::with_minimal_config();

    for notifier in [
        RecordingNotifier::failing(),
        RecordingNotifier::with_status(500),
        RecordingNotifier::unconfigured(),
    ] {
        let executor = MockExecutor::new();
        let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();

        assert_eq!(report.outcome(Stage::Transfer), Some(&StageOutcome::Succeeded));
        assert_eq!(report.outcome(Stage::ClearLocalDirs), Some(&StageOutcome::Succeeded));
        assert_ne!(report.outcome(Stage::NotifyComplete), Some(&StageOutcome::Succeeded));
    }
}

#[test]
fn test_report_serializes_stage_outcomes() {
    let ctx = TestContext::with_minimal_config();
    let executor = MockExecutor::new();
    let notifier = RecordingNotifier::unconfigured();

    let report = manager(&ctx, &executor, &notifier).run_at(sample_stamp()).unwrap();
    let json = report.to_json().unwrap();

    assert!(json.contains(STAMP));
    assert!(json.contains("\"transfer\""));
    assert!(json.contains("\"succeeded\""));
    assert!(json.contains("no notifier configured"));
}
