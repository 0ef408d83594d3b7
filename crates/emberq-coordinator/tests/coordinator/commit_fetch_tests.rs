use super::test_utilities::*;
use emberq_coordinator::{ErrorCode, OffsetValue, INVALID_OFFSET};
use test_log::test;

#[test]
fn test_commit_and_fetch_roundtrip() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    let codes = coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(42, "x", 1_000))],
    );
    assert_eq!(codes[&partition("t", 0)], ErrorCode::None);

    let fetched = coordinator.manager.get_offsets("g1", &[partition("t", 0)]).unwrap();
    let status = &fetched[&partition("t", 0)];
    assert_eq!(status.offset, 42);
    assert_eq!(status.metadata, "x");
    assert_eq!(status.error, ErrorCode::None);
}

#[test]
fn test_commit_fetch_sweep_then_no_offset() {
    // Commit timestamps far in the past, so the entry is already expired
    // relative to the wall clock the sweeper uses.
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(42, "x", 1_000))],
    );

    let removed = coordinator.manager.sweep_expired_offsets();
    assert_eq!(removed, 1);

    let fetched = coordinator.manager.get_offsets("g1", &[partition("t", 0)]).unwrap();
    let status = &fetched[&partition("t", 0)];
    assert_eq!(status.offset, INVALID_OFFSET);
    assert_eq!(status.error, ErrorCode::NoOffset);
}

#[test]
fn test_fetch_unknown_partition_reports_no_offset() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(1, "", 1_000))],
    );

    let fetched = coordinator
        .manager
        .get_offsets("g1", &[partition("t", 0), partition("t", 9)])
        .unwrap();
    assert_eq!(fetched[&partition("t", 0)].error, ErrorCode::None);
    assert_eq!(fetched[&partition("t", 9)].error, ErrorCode::NoOffset);
    assert_eq!(fetched[&partition("t", 9)].offset, INVALID_OFFSET);
}

#[test]
fn test_fetch_all_returns_every_cached_offset() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    coordinator.commit(
        "g1",
        vec![
            (partition("t", 0), committed_at(5, "", 1_000)),
            (partition("t", 1), committed_at(6, "", 1_000)),
            (partition("u", 0), committed_at(7, "", 1_000)),
        ],
    );
    coordinator.commit(
        "g2",
        vec![(partition("t", 0), committed_at(99, "", 1_000))],
    );

    let fetched = coordinator.manager.get_offsets("g1", &[]).unwrap();
    assert_eq!(fetched.len(), 3);
    assert!(fetched.values().all(|status| status.error == ErrorCode::None));
    assert_eq!(fetched[&partition("t", 1)].offset, 6);
    assert_eq!(fetched[&partition("u", 0)].offset, 7);
}

#[test]
fn test_later_commit_overwrites_earlier_one() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(5, "first", 1_000))],
    );
    coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(7, "second", 2_000))],
    );

    let fetched = coordinator.manager.get_offsets("g1", &[partition("t", 0)]).unwrap();
    let status = &fetched[&partition("t", 0)];
    assert_eq!(status.offset, 7);
    assert_eq!(status.metadata, "second");
    assert_eq!(coordinator.manager.num_offsets(), 1);
}

#[test]
fn test_commit_appends_records_to_offsets_partition() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    coordinator.commit(
        "g1",
        vec![(partition("t", 0), committed_at(42, "x", 1_000))],
    );

    let log = coordinator
        .store
        .records(&coordinator.offsets_partition("g1"));
    assert_eq!(log.len(), 1);
    assert!(!log[0].is_tombstone());
}

#[test]
fn test_commit_with_empty_metadata_is_accepted() {
    let coordinator = TestCoordinator::new(1);
    coordinator.own_all_partitions();

    let codes = coordinator.commit(
        "g1",
        vec![(partition("t", 0), OffsetValue::new(3, "", 1_000, 11_000))],
    );
    assert_eq!(codes[&partition("t", 0)], ErrorCode::None);
}

#[test]
fn test_cached_counts_track_commits_and_groups() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();
    assert_eq!(coordinator.manager.num_offsets(), 0);
    assert_eq!(coordinator.manager.num_groups(), 0);

    coordinator.commit(
        "g1",
        vec![
            (partition("t", 0), committed_at(1, "", 1_000)),
            (partition("t", 1), committed_at(2, "", 1_000)),
        ],
    );
    coordinator.manager.add_group("g1", "consumer");

    assert_eq!(coordinator.manager.num_offsets(), 2);
    assert_eq!(coordinator.manager.num_groups(), 1);
    assert_eq!(coordinator.manager.current_groups().len(), 1);
}
