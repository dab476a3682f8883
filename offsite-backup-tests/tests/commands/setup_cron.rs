//! Tests for the 'setup-cron' command

use offsite_backup::utils::cron::{upsert_entry, validate_cron_schedule, CronJob};
use rstest::rstest;
use std::path::Path;

fn render(job: &CronJob) -> String {
    job.render(
        Path::new("/usr/local/bin/offsite-backup"),
        Path::new("/etc/offsite-backup/config.toml"),
        Path::new("/var/log/offsite-backup/cron.log"),
    )
}

#[test]
fn test_run_entry() {
    let entry = render(&CronJob::new("run", "0 2 * * *", &["run"]));

    assert_eq!(
        entry,
        "# offsite-backup: run\n0 2 * * * /usr/local/bin/offsite-backup --config /etc/offsite-backup/config.toml run >> /var/log/offsite-backup/cron.log 2>&1"
    );
}

#[test]
fn test_remote_prune_entry() {
    let entry = render(&CronJob::new("prune", "30 4 * * 0", &["prune", "--remote"]));
    assert!(entry.contains("config.toml prune --remote >>"));
}

#[test]
fn test_reinstall_replaces_entry() {
    let existing = "MAILTO=root\n0 1 * * * /usr/bin/other\n";
    let first = render(&CronJob::new("run", "0 2 * * *", &["run"]));
    let second = render(&CronJob::new("run", "0 3 * * *", &["run"]));

    let once = upsert_entry(existing, "# offsite-backup: run", &first);
    let twice = upsert_entry(&once, "# offsite-backup: run", &second);

    assert!(twice.starts_with(existing));
    assert_eq!(twice.matches("# offsite-backup: run").count(), 1);
    assert!(twice.contains("0 3 * * *"));
    assert!(!twice.contains("0 2 * * *"));
}

#[test]
fn test_entries_for_different_jobs_coexist() {
    let run = render(&CronJob::new("run", "0 2 * * *", &["run"]));
    let prune = render(&CronJob::new("prune", "0 5 * * *", &["prune"]));

    let content = upsert_entry("", "# offsite-backup: run", &run);
    let content = upsert_entry(&content, "# offsite-backup: prune", &prune);

    assert!(content.contains("# offsite-backup: run\n"));
    assert!(content.contains("# offsite-backup: prune\n"));
}

#[rstest]
#[case("0 2 * * *", true)]
#[case("*/15 * * * 1-5", true)]
#[case("0 2 * *", false)]
#[case("daily", false)]
fn test_schedule_validation(#[case] schedule: &str, #[case] valid: bool) {
    assert_eq!(validate_cron_schedule(schedule), valid);
}
