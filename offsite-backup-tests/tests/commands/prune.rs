//! Tests for the 'prune' command
//!
//! Remote passes go through an SSH session on the mocked executor; local
//! passes work on a real tree in the temp dir.

use offsite_backup::stages::retention::{prune, prune_local, RemoteTree};
use offsite_backup::utils::locker::RunLock;
use offsite_backup::utils::ssh::{RemoteSession, RemoteTarget};
use std::time::Duration;
use test_utils::{create_family_tree, family_entry_names, MockExecutor, MockResponse, TestContext};

const TIMEOUT: Duration = Duration::from_secs(60);

fn target() -> RemoteTarget {
    RemoteTarget {
        host: "backup.example.net".to_string(),
        port: 22,
        user: "backup".to_string(),
        password: "secret".to_string(),
    }
}

fn remote_family(listing: &str) -> MockExecutor {
    MockExecutor::new()
        .expect_when(
            "ssh",
            "find -L '/media/backups' ",
            MockResponse::stdout("nextcloud-server\nedge1\n"),
        )
        .expect_when(
            "ssh",
            "find -L '/media/backups/nextcloud-server' ",
            MockResponse::stdout(listing),
        )
}

fn removals(executor: &MockExecutor) -> Vec<String> {
    executor
        .calls_to("ssh")
        .into_iter()
        .filter_map(|c| c.args.last().cloned())
        .filter(|cmd| cmd.starts_with("rm -rf"))
        .collect()
}

#[test]
fn test_remote_prune_keeps_newest() {
    let executor = remote_family(
        "srv_2024-01-10_00-00-00\nsrv_2024-01-12_00-00-00\nsrv_2024-01-11_00-00-00\n",
    );

    let report = {
        let session = RemoteSession::open(&executor, target(), TIMEOUT).unwrap();
        prune(&RemoteTree::new(&session), "/media/backups", "nextcloud-server", 1).unwrap()
    };

    assert_eq!(report.survivors, vec!["/media/backups/nextcloud-server/srv_2024-01-12_00-00-00"]);
    assert_eq!(
        removals(&executor),
        vec![
            "rm -rf -- '/media/backups/nextcloud-server/srv_2024-01-11_00-00-00'",
            "rm -rf -- '/media/backups/nextcloud-server/srv_2024-01-10_00-00-00'",
        ]
    );
}

#[test]
fn test_remote_prune_continues_after_failed_removal() {
    let executor = remote_family(
        "srv_2024-01-10_00-00-00\nsrv_2024-01-12_00-00-00\nsrv_2024-01-11_00-00-00\n",
    )
    .expect_when(
        "ssh",
        "rm -rf -- '/media/backups/nextcloud-server/srv_2024-01-11",
        MockResponse::failure(1, "Permission denied"),
    );

    let report = {
        let session = RemoteSession::open(&executor, target(), TIMEOUT).unwrap();
        prune(&RemoteTree::new(&session), "/media/backups", "nextcloud-server", 1).unwrap()
    };

    assert!(!report.is_clean());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].path.ends_with("srv_2024-01-11_00-00-00"));
    assert_eq!(report.removed, vec!["/media/backups/nextcloud-server/srv_2024-01-10_00-00-00"]);
}

#[test]
fn test_remote_prune_of_single_entry_removes_nothing() {
    let executor = remote_family("srv_2024-01-10_00-00-00\nnextcloud-server-broken\n");

    {
        let session = RemoteSession::open(&executor, target(), TIMEOUT).unwrap();
        prune(&RemoteTree::new(&session), "/media/backups", "nextcloud-server", 1).unwrap();
    }

    assert!(removals(&executor).is_empty());
}

#[test]
fn test_remote_listing_failure_is_an_error() {
    let executor = MockExecutor::new().expect_when(
        "ssh",
        "find ",
        MockResponse::failure(1, "find: '/media/backups': No such file or directory"),
    );

    let session = RemoteSession::open(&executor, target(), TIMEOUT).unwrap();
    let result = prune(&RemoteTree::new(&session), "/media/backups", "nextcloud-server", 1);

    assert!(result.is_err());
}

#[test]
fn test_session_is_closed_after_prune() {
    let executor = remote_family("");
    {
        let session = RemoteSession::open(&executor, target(), TIMEOUT).unwrap();
        prune(&RemoteTree::new(&session), "/media/backups", "nextcloud-server", 1).unwrap();
    }

    let last = executor.get_calls().pop().unwrap();
    assert_eq!(last.program, "ssh");
    assert!(last.command.has_arg("-O"));
    assert!(last.command.has_arg("exit"));
}

#[test]
fn test_local_prune_of_server_family() {
    let ctx = TestContext::new();
    let root = ctx.create_subdir("backups");
    create_family_tree(&root, "edge1", &family_entry_names("edge1"));

    let report = prune_local(&root, "edge1", 1).unwrap();

    assert_eq!(report.removed.len(), 2);
    assert_eq!(ctx.list_dir("backups/edge1"), vec!["backup_edge1_2024-01-12_00-00-00"]);
}

#[test]
fn test_prune_lock_excludes_a_second_pass() {
    let ctx = TestContext::new();
    let locks = ctx.create_subdir("locks");

    let nested = RunLock::new(&locks, "prune-edge1")
        .hold(|| RunLock::new(&locks, "prune-edge1").hold(|| ()).is_err())
        .unwrap();
    assert!(nested);

    // other families are independent
    let other = RunLock::new(&locks, "prune-edge1")
        .hold(|| RunLock::new(&locks, "prune-edge2").hold(|| ()).is_ok())
        .unwrap();
    assert!(other);
}
