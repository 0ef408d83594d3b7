//! In-memory offset and group caches.
//!
//! Both maps are concurrent and per-key atomic; multi-key consistency is the
//! manager's job (it serializes ownership changes and reads through the
//! partition registry lock). Values live here only while this broker is the
//! coordinator for their group's offsets partition.

use std::sync::Arc;

use dashmap::DashMap;

use crate::codec::{OffsetKey, OffsetValue};
use crate::group::{GroupMetadata, SharedGroup};
use crate::metrics;

#[derive(Debug, Default)]
pub struct MetadataCache {
    offsets: DashMap<OffsetKey, OffsetValue>,
    groups: DashMap<String, SharedGroup>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_group(&self, group_id: &str) -> Option<SharedGroup> {
        self.groups.get(group_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert an empty group if absent; under concurrent calls for the same
    /// id every caller sees the one winning entry.
    pub fn add_group(&self, group_id: &str, protocol_type: &str) -> SharedGroup {
        let entry = self
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| GroupMetadata::new(group_id, protocol_type).into_shared());
        let group = Arc::clone(entry.value());
        drop(entry);
        metrics::record_cached_groups(self.groups.len());
        group
    }

    /// Replace whatever is cached for the group. Used when replaying the
    /// log, where the record is authoritative.
    pub fn put_group(&self, group_id: String, group: SharedGroup) {
        self.groups.insert(group_id, group);
        metrics::record_cached_groups(self.groups.len());
    }

    /// Remove the group only if the cached entry is `expected` itself.
    /// Returns false when the entry is missing or has been replaced.
    pub fn remove_group_if_same(&self, group_id: &str, expected: &SharedGroup) -> bool {
        let removed = self
            .groups
            .remove_if(group_id, |_, cached| Arc::ptr_eq(cached, expected))
            .is_some();
        if removed {
            metrics::record_cached_groups(self.groups.len());
        }
        removed
    }

    pub fn remove_group(&self, group_id: &str) -> Option<SharedGroup> {
        let removed = self.groups.remove(group_id).map(|(_, group)| group);
        if removed.is_some() {
            metrics::record_cached_groups(self.groups.len());
        }
        removed
    }

    pub fn current_groups(&self) -> Vec<SharedGroup> {
        self.groups
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn get_offset(&self, key: &OffsetKey) -> Option<OffsetValue> {
        self.offsets.get(key).map(|entry| entry.value().clone())
    }

    pub fn put_offset(&self, key: OffsetKey, value: OffsetValue) {
        self.offsets.insert(key, value);
        metrics::record_cached_offsets(self.offsets.len());
    }

    pub fn remove_offset(&self, key: &OffsetKey) {
        self.offsets.remove(key);
        metrics::record_cached_offsets(self.offsets.len());
    }

    pub fn offsets_for_group(&self, group_id: &str) -> Vec<(OffsetKey, OffsetValue)> {
        self.offsets
            .iter()
            .filter(|entry| entry.key().group == group_id)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Remove and return every offset whose group satisfies `routes_here`.
    pub fn evict_offsets_where(
        &self,
        routes_here: impl Fn(&str) -> bool,
    ) -> Vec<OffsetKey> {
        let evicted: Vec<OffsetKey> = self
            .offsets
            .iter()
            .filter(|entry| routes_here(&entry.key().group))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &evicted {
            self.offsets.remove(key);
        }
        metrics::record_cached_offsets(self.offsets.len());
        evicted
    }

    /// Remove and return every group satisfying `routes_here`.
    pub fn evict_groups_where(
        &self,
        routes_here: impl Fn(&str) -> bool,
    ) -> Vec<SharedGroup> {
        let evicted_ids: Vec<String> = self
            .groups
            .iter()
            .filter(|entry| routes_here(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        let mut evicted = Vec::with_capacity(evicted_ids.len());
        for id in evicted_ids {
            if let Some((_, group)) = self.groups.remove(&id) {
                evicted.push(group);
            }
        }
        metrics::record_cached_groups(self.groups.len());
        evicted
    }

    /// Remove and return every offset whose expiry precedes `now_ms`.
    pub fn take_expired_offsets(&self, now_ms: i64) -> Vec<(OffsetKey, OffsetValue)> {
        let expired: Vec<(OffsetKey, OffsetValue)> = self
            .offsets
            .iter()
            .filter(|entry| entry.value().expire_timestamp < now_ms)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (key, _) in &expired {
            self.offsets.remove(key);
        }
        metrics::record_cached_offsets(self.offsets.len());
        expired
    }

    pub fn num_offsets(&self) -> usize {
        self.offsets.len()
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
}
