use std::collections::HashMap;

use super::test_utilities::*;
use emberq_coordinator::codec::{
    encode_group_key, encode_group_value, encode_offset_key, encode_offset_value,
};
use emberq_coordinator::store::LogRecord;
use emberq_coordinator::{
    ErrorCode, GroupMetadata, GroupState, MemberMetadata, OffsetKey, OffsetValue, TopicPartition,
};
use test_log::test;

fn offset_record(group: &str, topic: &str, partition: i32, offset: i64) -> LogRecord {
    LogRecord::new(
        encode_offset_key(&OffsetKey::new(group, topic, partition)),
        encode_offset_value(&OffsetValue::new(offset, "", 1_000, 100_000)),
    )
}

fn offset_tombstone(group: &str, topic: &str, partition: i32) -> LogRecord {
    LogRecord::tombstone(encode_offset_key(&OffsetKey::new(group, topic, partition)))
}

#[test]
fn test_load_replays_compacted_log_last_writer_wins() {
    let coordinator = TestCoordinator::new(4);
    let offsets_partition = coordinator.offsets_partition("g");

    coordinator.store.seed(
        offsets_partition,
        vec![
            offset_record("g", "t", 0, 5),
            offset_record("g", "t", 0, 7),
            offset_tombstone("g", "t", 0),
            offset_record("g", "t", 1, 9),
        ],
    );

    coordinator
        .manager
        .add_partition_ownership(coordinator.manager.partition_for("g"));

    let fetched = coordinator
        .manager
        .get_offsets("g", &[partition("t", 0), partition("t", 1)])
        .unwrap();
    assert_eq!(fetched[&partition("t", 0)].error, ErrorCode::NoOffset);
    assert_eq!(fetched[&partition("t", 1)].offset, 9);
    assert_eq!(coordinator.manager.num_offsets(), 1);
}

#[test]
fn test_load_tombstone_after_reelection_clears_earlier_commit() {
    let coordinator = TestCoordinator::new(1);
    coordinator.store.seed(
        coordinator.offsets_partition("g"),
        vec![offset_record("g", "t", 2, 4), offset_tombstone("g", "t", 2)],
    );

    coordinator.manager.add_partition_ownership(0);
    let fetched = coordinator.manager.get_offsets("g", &[partition("t", 2)]).unwrap();
    assert_eq!(fetched[&partition("t", 2)].error, ErrorCode::NoOffset);
}

#[test]
fn test_load_restores_group_metadata() {
    let coordinator = TestCoordinator::new(4);

    let mut group = GroupMetadata::new("g", "consumer");
    group.generation_id = 3;
    group.protocol = Some("range".to_string());
    group.leader_id = Some("m1".to_string());
    group.add(
        "m1".to_string(),
        MemberMetadata::new(
            "m1",
            "client",
            "/10.1.1.1",
            30_000,
            vec![("range".to_string(), b"topics".to_vec())],
        ),
    );
    let value = encode_group_value(&group, &HashMap::new()).unwrap();

    coordinator.store.seed(
        coordinator.offsets_partition("g"),
        vec![LogRecord::new(encode_group_key("g"), value)],
    );
    coordinator
        .manager
        .add_partition_ownership(coordinator.manager.partition_for("g"));

    let restored = coordinator.manager.get_group("g").expect("group loaded");
    let restored = restored.lock();
    assert_eq!(restored.generation_id, 3);
    assert_eq!(restored.protocol.as_deref(), Some("range"));
    assert_eq!(restored.leader_id.as_deref(), Some("m1"));
    assert_eq!(restored.member_count(), 1);
    assert!(restored.is(GroupState::Stable));
}

#[test]
fn test_load_group_tombstone_kills_cached_group() {
    let coordinator = TestCoordinator::new(1);
    coordinator.manager.add_partition_ownership(0);

    // The group exists in the cache, then a tombstone arrives via reload.
    let cached = coordinator.manager.add_group("g", "consumer");
    coordinator.store.seed(
        coordinator.offsets_partition("g"),
        vec![LogRecord::tombstone(encode_group_key("g"))],
    );
    coordinator.manager.remove_partition_ownership(0);

    // Demotion already evicted and killed the group.
    assert!(cached.lock().is(GroupState::Dead));

    coordinator.manager.add_partition_ownership(0);
    assert!(coordinator.manager.get_group("g").is_none());
}

#[test]
fn test_load_without_log_succeeds_and_clears_loading() {
    let coordinator = TestCoordinator::new(1);
    // Partition 0 exists but has never been written; erase it by using a
    // partition id outside the created range.
    coordinator.manager.add_partition_ownership(7);
    assert!(!coordinator.manager.is_loading());
}

#[test]
fn test_load_aborts_on_undecodable_record() {
    let coordinator = TestCoordinator::new(1);
    coordinator.store.seed(
        coordinator.offsets_partition("g"),
        vec![
            LogRecord::new(vec![0xde, 0xad], b"junk".to_vec()),
            offset_record("g", "t", 0, 5),
        ],
    );

    coordinator.manager.add_partition_ownership(0);

    // The load stopped at the corrupt record; nothing after it was applied
    // and the loading flag still cleared.
    assert_eq!(coordinator.manager.num_offsets(), 0);
    assert!(!coordinator.manager.is_loading());
}

#[test]
fn test_shutdown_stops_load_at_record_boundary() {
    let coordinator = ManualLoadCoordinator::new(1);
    let offsets_partition = TopicPartition::new(
        coordinator.manager.config().offsets_topic_name.clone(),
        0,
    );
    coordinator
        .store
        .seed(offsets_partition, vec![offset_record("g", "t", 0, 5)]);

    coordinator.manager.add_partition_ownership(0);
    coordinator.manager.shutdown();
    coordinator.scheduler.fire_one_shot_tasks();

    assert_eq!(coordinator.manager.num_offsets(), 0);
    assert!(!coordinator.manager.is_loading());
}
