//! Consumer group metadata as cached by the coordinator.
//!
//! The membership protocol (join, sync, heartbeat, rebalance timing) lives
//! outside this crate; it manipulates these values through the per-group
//! monitor. The coordinator itself only creates empty groups, persists them,
//! replays them from the offsets topic, and retires them to `Dead`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::locks::{RankedMutex, RANK_GROUP_MONITOR};

/// Current state of a consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Members are rejoining after a membership change.
    PreparingRebalance,
    /// Waiting for the leader to provide the partition assignment.
    AwaitingSync,
    /// All members are active and assignments are distributed.
    Stable,
    /// The group has been removed from this coordinator.
    Dead,
}

impl GroupState {
    /// Valid edges of the group state machine. Every state may move to
    /// `Dead`; `Dead` is terminal.
    pub const fn can_transition_to(current: GroupState, target: GroupState) -> bool {
        match (current, target) {
            (_, GroupState::Dead) => true,
            (GroupState::Dead, _) => false,
            (GroupState::Stable, GroupState::PreparingRebalance) => true,
            (GroupState::AwaitingSync, GroupState::PreparingRebalance) => true,
            (GroupState::PreparingRebalance, GroupState::AwaitingSync) => true,
            (GroupState::AwaitingSync, GroupState::Stable) => true,
            _ => false,
        }
    }
}

/// One member of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMetadata {
    pub member_id: String,
    pub client_id: String,
    pub client_host: String,
    pub session_timeout_ms: i32,
    /// Protocol name → subscription metadata registered by the member. The
    /// entry for the group's selected protocol is what gets persisted.
    pub supported_protocols: Vec<(String, Vec<u8>)>,
    pub assignment: Vec<u8>,
}

impl MemberMetadata {
    pub fn new(
        member_id: impl Into<String>,
        client_id: impl Into<String>,
        client_host: impl Into<String>,
        session_timeout_ms: i32,
        supported_protocols: Vec<(String, Vec<u8>)>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            client_id: client_id.into(),
            client_host: client_host.into(),
            session_timeout_ms,
            supported_protocols,
            assignment: Vec::new(),
        }
    }

    /// Subscription metadata the member registered for `protocol`.
    pub fn metadata(&self, protocol: &str) -> Option<&[u8]> {
        self.supported_protocols
            .iter()
            .find(|(name, _)| name == protocol)
            .map(|(_, metadata)| metadata.as_slice())
    }
}

/// Group metadata, always reached through its monitor ([`SharedGroup`]).
#[derive(Debug)]
pub struct GroupMetadata {
    pub group_id: String,
    pub protocol_type: String,
    /// Advanced by the membership subsystem on every rebalance; preserved
    /// verbatim across log round trips.
    pub generation_id: i32,
    pub protocol: Option<String>,
    pub leader_id: Option<String>,
    state: GroupState,
    members: HashMap<String, MemberMetadata>,
}

impl GroupMetadata {
    pub fn new(group_id: impl Into<String>, protocol_type: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            protocol_type: protocol_type.into(),
            generation_id: 0,
            protocol: None,
            leader_id: None,
            state: GroupState::Stable,
            members: HashMap::new(),
        }
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn is(&self, state: GroupState) -> bool {
        self.state == state
    }

    /// Move the group to `target`. Callers must hold the group monitor; an
    /// invalid edge is a programming error.
    pub fn transition_to(&mut self, target: GroupState) {
        debug_assert!(
            GroupState::can_transition_to(self.state, target),
            "invalid group state transition {:?} -> {:?} for {}",
            self.state,
            target,
            self.group_id
        );
        self.state = target;
    }

    pub fn add(&mut self, member_id: String, member: MemberMetadata) {
        self.members.insert(member_id, member);
    }

    pub fn remove(&mut self, member_id: &str) -> Option<MemberMetadata> {
        self.members.remove(member_id)
    }

    pub fn member(&self, member_id: &str) -> Option<&MemberMetadata> {
        self.members.get(member_id)
    }

    pub fn all_member_metadata(&self) -> Vec<&MemberMetadata> {
        self.members.values().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Wrap the group in its monitor for insertion into the cache.
    pub fn into_shared(self) -> SharedGroup {
        Arc::new(RankedMutex::new(RANK_GROUP_MONITOR, self))
    }
}

/// A cached group behind its monitor. Every mutation of the group,
/// including state transitions, happens under this lock.
pub type SharedGroup = Arc<RankedMutex<GroupMetadata>>;
