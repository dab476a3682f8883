//! Tests for retention over a real directory tree

use offsite_backup::stages::retention::{prune_local, scan_family, LocalTree};
use rstest::rstest;
use std::fs;
use tempfile::TempDir;
use test_utils::create_family_tree;

fn names(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| format!("srv_{}", t)).collect()
}

fn remaining(family_dir: &std::path::Path) -> Vec<String> {
    let mut left: Vec<String> = fs::read_dir(family_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    left.sort();
    left
}

#[rstest]
#[case(&[])]
#[case(&["2024-01-10_00-00-00"])]
#[case(&["2024-01-10_00-00-00", "2024-01-11_00-00-00"])]
#[case(&["2023-06-01_12-00-00", "2024-01-11_00-00-00", "2022-01-01_00-00-00", "2024-01-10_23-59-59"])]
fn test_exactly_the_newest_survives(#[case] tokens: &[&str]) {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(temp.path(), "srv", &names(tokens));

    let report = prune_local(temp.path(), "srv", 1).unwrap();

    let left = remaining(&family_dir);
    assert_eq!(left.len(), tokens.len().min(1));
    if let Some(newest) = tokens.iter().max() {
        assert_eq!(left, vec![format!("srv_{}", newest)]);
    }
    assert_eq!(report.removed.len(), tokens.len().saturating_sub(1));
    assert!(report.is_clean());
}

#[test]
fn test_single_family_scenario() {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(
        temp.path(),
        "srv",
        &names(&["2024-01-10_00-00-00", "2024-01-12_00-00-00", "2024-01-11_00-00-00"]),
    );

    prune_local(temp.path(), "srv", 1).unwrap();

    assert_eq!(remaining(&family_dir), vec!["srv_2024-01-12_00-00-00"]);
}

#[test]
fn test_second_pass_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(
        temp.path(),
        "srv",
        &names(&["2024-01-10_00-00-00", "2024-01-12_00-00-00", "2024-01-11_00-00-00"]),
    );

    let first = prune_local(temp.path(), "srv", 1).unwrap();
    let after_first = remaining(&family_dir);
    let second = prune_local(temp.path(), "srv", 1).unwrap();

    assert_eq!(remaining(&family_dir), after_first);
    assert_eq!(second.survivors, first.survivors);
    assert!(second.removed.is_empty());
}

#[test]
fn test_non_matching_names_are_never_touched() {
    let temp = TempDir::new().unwrap();
    let mut entries = names(&["2024-01-10_00-00-00", "2024-01-11_00-00-00"]);
    entries.push("nextcloud-server-broken".to_string());
    // newer looking, but not a valid date
    entries.push("srv_2099-99-99_00-00-00".to_string());
    let family_dir = create_family_tree(temp.path(), "srv", &entries);

    let report = prune_local(temp.path(), "srv", 1).unwrap();

    assert_eq!(
        remaining(&family_dir),
        vec!["nextcloud-server-broken", "srv_2024-01-11_00-00-00", "srv_2099-99-99_00-00-00"]
    );
    assert_eq!(report.survivors.len(), 1);
    assert!(report.survivors[0].ends_with("srv_2024-01-11_00-00-00"));
}

#[test]
fn test_plain_files_are_not_entries() {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(temp.path(), "srv", &names(&["2024-01-11_00-00-00"]));
    fs::write(family_dir.join("srv_2024-01-10_00-00-00"), "not a directory").unwrap();

    prune_local(temp.path(), "srv", 1).unwrap();

    assert!(family_dir.join("srv_2024-01-10_00-00-00").is_file());
}

#[test]
fn test_missing_family_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    create_family_tree(temp.path(), "other", &names(&["2024-01-10_00-00-00", "2024-01-11_00-00-00"]));

    let report = prune_local(temp.path(), "srv", 1).unwrap();

    assert!(report.survivors.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(remaining(&temp.path().join("other")).len(), 2);
}

#[test]
fn test_keep_more_than_one() {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(
        temp.path(),
        "srv",
        &names(&["2024-01-10_00-00-00", "2024-01-12_00-00-00", "2024-01-11_00-00-00"]),
    );

    let report = prune_local(temp.path(), "srv", 2).unwrap();

    assert_eq!(
        remaining(&family_dir),
        vec!["srv_2024-01-11_00-00-00", "srv_2024-01-12_00-00-00"]
    );
    assert_eq!(report.removed.len(), 1);
}

#[test]
fn test_missing_root_is_an_error() {
    let temp = TempDir::new().unwrap();
    assert!(prune_local(&temp.path().join("absent"), "srv", 1).is_err());
}

#[test]
fn test_scan_orders_newest_first() {
    let temp = TempDir::new().unwrap();
    let family_dir = create_family_tree(
        temp.path(),
        "srv",
        &names(&["2024-01-10_00-00-00", "2024-01-12_00-00-00", "2024-01-11_00-00-00"]),
    );

    let entries = scan_family(&LocalTree, &family_dir.display().to_string()).unwrap();
    let order: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

    assert_eq!(
        order,
        vec!["srv_2024-01-12_00-00-00", "srv_2024-01-11_00-00-00", "srv_2024-01-10_00-00-00"]
    );
}
