use super::test_utilities::*;
use emberq_coordinator::ErrorCode;
use test_log::test;

#[test]
fn test_fetch_without_ownership_is_not_coordinator() {
    let coordinator = TestCoordinator::new(2);

    let fetched = coordinator.manager.get_offsets("g2", &[partition("t", 0)]);
    assert_eq!(fetched, Err(ErrorCode::NotCoordinatorForGroup));
    assert!(!coordinator.manager.is_group_local("g2"));
}

#[test]
fn test_fetch_all_without_ownership_is_not_coordinator() {
    // The fetch-all form must fail the same way as an explicit request; an
    // empty success would be indistinguishable from a group with no
    // commits.
    let coordinator = TestCoordinator::new(2);

    let fetched = coordinator.manager.get_offsets("g2", &[]);
    assert_eq!(fetched, Err(ErrorCode::NotCoordinatorForGroup));
}

#[test]
fn test_ownership_makes_group_local() {
    let coordinator = TestCoordinator::new(4);
    assert!(!coordinator.manager.is_group_local("g"));

    coordinator
        .manager
        .add_partition_ownership(coordinator.manager.partition_for("g"));
    assert!(coordinator.manager.is_group_local("g"));
    assert!(!coordinator.manager.is_loading());
}

#[test]
fn test_demotion_evicts_only_entries_routed_to_the_partition() {
    let coordinator = TestCoordinator::new(2);
    coordinator.own_all_partitions();

    // Find two groups coordinated by different offsets partitions.
    let group_a = "group-a".to_string();
    let partition_a = coordinator.manager.partition_for(&group_a);
    let group_b = (0..100)
        .map(|i| format!("group-{i}"))
        .find(|group| coordinator.manager.partition_for(group) != partition_a)
        .expect("a group routed to the other partition");

    coordinator.commit(&group_a, vec![(partition("t", 0), committed_at(1, "", 1_000))]);
    coordinator.commit(&group_b, vec![(partition("t", 0), committed_at(2, "", 1_000))]);
    coordinator.manager.add_group(&group_a, "consumer");
    coordinator.manager.add_group(&group_b, "consumer");

    coordinator.manager.remove_partition_ownership(partition_a);

    let fetched = coordinator.manager.get_offsets(&group_a, &[partition("t", 0)]);
    assert_eq!(fetched, Err(ErrorCode::NotCoordinatorForGroup));
    assert!(coordinator.manager.get_group(&group_a).is_none());

    // The group on the surviving partition is untouched.
    let fetched = coordinator.manager.get_offsets(&group_b, &[partition("t", 0)]).unwrap();
    assert_eq!(fetched[&partition("t", 0)].offset, 2);
    assert!(coordinator.manager.get_group(&group_b).is_some());
    assert_eq!(coordinator.manager.num_offsets(), 1);
}

#[test]
fn test_demotion_then_promotion_reloads_from_log() {
    let coordinator = TestCoordinator::new(1);
    coordinator.own_all_partitions();

    coordinator.commit("g", vec![(partition("t", 0), committed_at(10, "", 1_000))]);
    coordinator.manager.remove_partition_ownership(0);
    assert_eq!(coordinator.manager.num_offsets(), 0);

    // The log still holds the commit; re-election replays it.
    coordinator.manager.add_partition_ownership(0);
    let fetched = coordinator.manager.get_offsets("g", &[partition("t", 0)]).unwrap();
    assert_eq!(fetched[&partition("t", 0)].offset, 10);
}

#[test]
fn test_repeated_promotion_schedules_one_load() {
    let coordinator = ManualLoadCoordinator::new(2);

    coordinator.manager.add_partition_ownership(0);
    coordinator.manager.add_partition_ownership(0);

    assert_eq!(coordinator.scheduler.scheduled("load-offsets-partition-0"), 1);
    assert!(coordinator.manager.is_loading());

    assert_eq!(coordinator.scheduler.fire_one_shot_tasks(), 1);
    assert!(!coordinator.manager.is_loading());

    // With the first load finished, a new election may load again.
    coordinator.manager.add_partition_ownership(0);
    assert_eq!(coordinator.scheduler.scheduled("load-offsets-partition-0"), 1);
}

#[test]
fn test_group_loading_window_is_visible() {
    let coordinator = ManualLoadCoordinator::new(1);

    coordinator.manager.add_partition_ownership(0);
    assert!(coordinator.manager.is_group_loading("any-group"));
    assert!(coordinator.manager.is_loading());

    coordinator.scheduler.fire_one_shot_tasks();
    assert!(!coordinator.manager.is_group_loading("any-group"));
}
