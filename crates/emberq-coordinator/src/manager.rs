//! The group and offset metadata manager.
//!
//! One instance runs per broker. It caches consumer group metadata and
//! committed offsets for the offsets-topic partitions this broker leads,
//! persists every mutation as an append to that compacted topic, rebuilds
//! the cache from the log on partition election, and expires stale offsets
//! with tombstones on a schedule.
//!
//! Lock order, outermost first: partition registry → offset-expire lock →
//! group monitor. `locks` asserts the order in debug builds.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use log::{debug, error, info, trace, warn};
use siphasher::sip::SipHasher;

use crate::cache::MetadataCache;
use crate::codec::{
    decode_group_value, decode_key, decode_offset_value, encode_group_key, encode_group_value,
    encode_offset_key, encode_offset_value, OffsetKey, OffsetValue, RecordKey,
};
use crate::config::CoordinatorConfig;
use crate::error::{CodecError, ErrorCode};
use crate::group::{GroupState, SharedGroup};
use crate::locks::{RankedMutex, RankedRwLock, RANK_OFFSET_EXPIRE, RANK_PARTITION_REGISTRY};
use crate::store::{
    AppendCompletion, AppendStatus, LogRecord, MessageStore, RecordBatch, Scheduler,
    TopicDirectory, TopicPartition,
};

/// Offset reported when no commit exists for a requested partition.
pub const INVALID_OFFSET: i64 = -1;

/// Per-partition outcome of an offset fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchStatus {
    pub offset: i64,
    pub metadata: String,
    pub error: ErrorCode,
}

impl OffsetFetchStatus {
    pub fn committed(value: &OffsetValue) -> Self {
        Self {
            offset: value.offset,
            metadata: value.metadata.clone(),
            error: ErrorCode::None,
        }
    }

    pub fn no_offset() -> Self {
        Self {
            offset: INVALID_OFFSET,
            metadata: String::new(),
            error: ErrorCode::NoOffset,
        }
    }

    /// Per-partition form of a fetch-wide error, used when encoding a
    /// failed fetch into a per-partition response.
    pub fn failed(error: ErrorCode) -> Self {
        Self {
            offset: INVALID_OFFSET,
            metadata: String::new(),
            error,
        }
    }
}

/// Responder invoked with one code per partition the caller tried to commit.
pub type OffsetCommitResponder = Box<dyn FnOnce(HashMap<TopicPartition, ErrorCode>) + Send>;

/// Responder invoked with the outcome of a group metadata store.
pub type GroupStoreResponder = Box<dyn FnOnce(ErrorCode) + Send>;

/// An append staged by one of the `prepare_*` entry points, ready to hand to
/// the replication engine via [`GroupMetadataManager::store`].
pub struct PreparedStore {
    partition: TopicPartition,
    batch: RecordBatch,
    completion: AppendCompletion,
}

#[derive(Debug, Default)]
struct PartitionOwnership {
    loading: HashSet<i32>,
    owned: HashSet<i32>,
}

enum LoadError {
    Read(ErrorCode),
    Decode(CodecError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Read(code) => write!(f, "log read failed: {code}"),
            LoadError::Decode(error) => write!(f, "record decode failed: {error}"),
        }
    }
}

pub struct GroupMetadataManager {
    /// Handle to this manager for the tasks it hands to the scheduler.
    me: Weak<GroupMetadataManager>,
    config: CoordinatorConfig,
    message_store: Arc<dyn MessageStore>,
    scheduler: Arc<dyn Scheduler>,
    cache: Arc<MetadataCache>,
    /// Registry lock. Guards both sets and the cache eviction on demotion.
    ownership: RankedMutex<PartitionOwnership>,
    /// Excludes the expiration sweeper from running against a partition
    /// that is concurrently being loaded, and vice versa.
    expire_lock: RankedRwLock<()>,
    offsets_partition_count: u32,
    shutting_down: AtomicBool,
}

impl GroupMetadataManager {
    /// Build the manager and register the expiration sweeper with the
    /// broker scheduler. The offsets-topic partition count comes from the
    /// directory when the topic already exists, otherwise from config.
    pub fn new(
        config: CoordinatorConfig,
        message_store: Arc<dyn MessageStore>,
        directory: &dyn TopicDirectory,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let offsets_partition_count = directory
            .partition_count(&config.offsets_topic_name)
            .unwrap_or(config.offsets_topic_num_partitions);
        assert!(
            offsets_partition_count >= 1,
            "offsets topic {} must have at least one partition",
            config.offsets_topic_name
        );

        let manager = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            message_store,
            scheduler,
            cache: Arc::new(MetadataCache::new()),
            ownership: RankedMutex::new(RANK_PARTITION_REGISTRY, PartitionOwnership::default()),
            expire_lock: RankedRwLock::new(RANK_OFFSET_EXPIRE, ()),
            offsets_partition_count,
            shutting_down: AtomicBool::new(false),
        });

        let sweeper = Arc::downgrade(&manager);
        manager.scheduler.schedule(
            "offsets-retention",
            Some(manager.config.offsets_retention_check_interval_ms),
            Box::new(move || {
                if let Some(manager) = sweeper.upgrade() {
                    manager.sweep_expired_offsets();
                }
            }),
        );
        info!(
            "Started group metadata manager for {} with {} partitions",
            manager.config.offsets_topic_name, offsets_partition_count
        );
        manager
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Offsets-topic partition that coordinates `group_id`. Deterministic
    /// across brokers and restarts: fixed-key SipHash over the group id.
    pub fn partition_for(&self, group_id: &str) -> i32 {
        let mut hasher = SipHasher::new();
        group_id.hash(&mut hasher);
        (hasher.finish() % u64::from(self.offsets_partition_count)) as i32
    }

    pub fn is_group_local(&self, group_id: &str) -> bool {
        self.ownership
            .lock()
            .owned
            .contains(&self.partition_for(group_id))
    }

    pub fn is_group_loading(&self, group_id: &str) -> bool {
        self.ownership
            .lock()
            .loading
            .contains(&self.partition_for(group_id))
    }

    pub fn is_loading(&self) -> bool {
        !self.ownership.lock().loading.is_empty()
    }

    // ============================================================================================
    // GROUP LOOKUP
    // ============================================================================================

    pub fn get_group(&self, group_id: &str) -> Option<SharedGroup> {
        self.cache.get_group(group_id)
    }

    /// Insert an empty group if none is cached and return the cached entry.
    pub fn add_group(&self, group_id: &str, protocol_type: &str) -> SharedGroup {
        self.cache.add_group(group_id, protocol_type)
    }

    /// Retire a group: transition it to `Dead` under its monitor, drop it
    /// from the cache, and append a tombstone so the compactor forgets it.
    /// The tombstone needs no acks; if the append fails, a later sweep or
    /// the next coordinator writes it again.
    pub fn remove_group(&self, group: &SharedGroup) {
        let group_id = {
            let mut locked = group.lock();
            locked.transition_to(GroupState::Dead);
            let group_id = locked.group_id.clone();
            if !self.cache.remove_group_if_same(&group_id, group) {
                panic!("group {group_id} cannot be removed: the cached entry is a different instance");
            }
            info!("Group {group_id} is dead and removed from the cache");
            group_id
        };

        let partition = TopicPartition::new(
            self.config.offsets_topic_name.clone(),
            self.partition_for(&group_id),
        );
        let target = partition.clone();
        let batch = RecordBatch {
            compression: self.config.offsets_topic_compression_codec,
            records: vec![LogRecord::tombstone(encode_group_key(&group_id))],
        };
        self.message_store.append(
            self.config.offset_commit_timeout_ms,
            0,
            true,
            HashMap::from([(partition, batch)]),
            Box::new(move |statuses: HashMap<TopicPartition, AppendStatus>| {
                match statuses.get(&target) {
                    Some(status) if status.error.is_error() => warn!(
                        "Failed to append tombstone for group {group_id} to {target}: {}",
                        status.error
                    ),
                    _ => {}
                }
            }),
        );
    }

    pub fn current_groups(&self) -> Vec<SharedGroup> {
        self.cache.current_groups()
    }

    pub fn num_groups(&self) -> usize {
        self.cache.num_groups()
    }

    pub fn num_offsets(&self) -> usize {
        self.cache.num_offsets()
    }

    // ============================================================================================
    // OFFSET FETCH
    // ============================================================================================

    /// Fetch committed offsets for a group. An empty `partitions` slice
    /// requests every cached offset of the group.
    ///
    /// When this broker does not coordinate the group the whole fetch fails
    /// with `NotCoordinatorForGroup`, including the fetch-all form; the
    /// request layer reports that code for every partition the caller named
    /// (see [`OffsetFetchStatus::failed`]).
    ///
    /// The whole lookup runs under the registry lock, so a concurrent
    /// demotion either finishes before (the fetch fails) or starts after
    /// (every answer reflects the cache before eviction). Stale reads are
    /// impossible.
    pub fn get_offsets(
        &self,
        group_id: &str,
        partitions: &[TopicPartition],
    ) -> Result<HashMap<TopicPartition, OffsetFetchStatus>, ErrorCode> {
        trace!("Fetching offsets of group {group_id}");
        let ownership = self.ownership.lock();
        if !ownership.owned.contains(&self.partition_for(group_id)) {
            return Err(ErrorCode::NotCoordinatorForGroup);
        }

        if partitions.is_empty() {
            return Ok(self
                .cache
                .offsets_for_group(group_id)
                .into_iter()
                .map(|(key, value)| {
                    (
                        TopicPartition::new(key.topic, key.partition),
                        OffsetFetchStatus::committed(&value),
                    )
                })
                .collect());
        }

        Ok(partitions
            .iter()
            .map(|partition| {
                let key = OffsetKey::new(group_id, partition.topic.clone(), partition.partition);
                let status = match self.cache.get_offset(&key) {
                    Some(value) => OffsetFetchStatus::committed(&value),
                    None => OffsetFetchStatus::no_offset(),
                };
                (partition.clone(), status)
            })
            .collect())
    }

    // ============================================================================================
    // STORE PIPELINE
    // ============================================================================================

    /// Stage an offset commit. Entries whose metadata exceeds
    /// `max_metadata_size` are dropped from the append and reported as
    /// `OffsetMetadataTooLarge`; the rest are written at the current value
    /// schema and enter the cache once the append succeeds.
    pub fn prepare_store_offsets(
        &self,
        group_id: &str,
        consumer_id: &str,
        generation_id: i32,
        offsets: HashMap<TopicPartition, OffsetValue>,
        respond: OffsetCommitResponder,
    ) -> PreparedStore {
        debug!(
            "Preparing offset commit from consumer {consumer_id} of group {group_id} (generation {generation_id})"
        );

        let mut kept: Vec<(TopicPartition, OffsetValue)> = Vec::with_capacity(offsets.len());
        let mut oversize: Vec<TopicPartition> = Vec::new();
        for (partition, value) in offsets {
            if value.metadata.len() > self.config.max_metadata_size {
                oversize.push(partition);
            } else {
                kept.push((partition, value));
            }
        }

        let records = kept
            .iter()
            .map(|(partition, value)| {
                let key = OffsetKey::new(group_id, partition.topic.clone(), partition.partition);
                LogRecord::new(encode_offset_key(&key), encode_offset_value(value))
            })
            .collect();
        let offsets_partition = TopicPartition::new(
            self.config.offsets_topic_name.clone(),
            self.partition_for(group_id),
        );

        let cache = Arc::clone(&self.cache);
        let group = group_id.to_string();
        let consumer = consumer_id.to_string();
        let target = offsets_partition.clone();
        let completion: AppendCompletion = Box::new(move |statuses| {
            if statuses.len() != 1 || !statuses.contains_key(&target) {
                panic!(
                    "offset commit append for group {group} returned statuses for {:?} instead of exactly {target}",
                    statuses.keys().collect::<Vec<_>>()
                );
            }
            let status = statuses[&target];

            if status.error == ErrorCode::None {
                for (partition, value) in &kept {
                    cache.put_offset(
                        OffsetKey::new(group.clone(), partition.topic.clone(), partition.partition),
                        value.clone(),
                    );
                }
            } else {
                debug!(
                    "Offset commit from consumer {consumer} of group {group} (generation {generation_id}) failed on {target}: {}",
                    status.error
                );
            }

            let code = status.error.offset_commit_error();
            let mut result = HashMap::with_capacity(kept.len() + oversize.len());
            for (partition, _) in kept {
                result.insert(partition, code);
            }
            for partition in oversize {
                result.insert(partition, ErrorCode::OffsetMetadataTooLarge);
            }
            respond(result);
        });

        PreparedStore {
            partition: offsets_partition,
            batch: RecordBatch {
                compression: self.config.offsets_topic_compression_codec,
                records,
            },
            completion,
        }
    }

    /// Stage a group metadata store with the leader-provided assignments.
    /// The cached group object was already built by the membership layer;
    /// success only makes it durable.
    pub fn prepare_store_group(
        &self,
        group: &SharedGroup,
        assignment: HashMap<String, Vec<u8>>,
        respond: GroupStoreResponder,
    ) -> Result<PreparedStore, CodecError> {
        let (group_id, value) = {
            let locked = group.lock();
            (
                locked.group_id.clone(),
                encode_group_value(&locked, &assignment)?,
            )
        };
        debug!("Preparing metadata store for group {group_id}");

        let offsets_partition = TopicPartition::new(
            self.config.offsets_topic_name.clone(),
            self.partition_for(&group_id),
        );
        let target = offsets_partition.clone();
        let record_key = encode_group_key(&group_id);
        let completion: AppendCompletion = Box::new(move |statuses| {
            if statuses.len() != 1 || !statuses.contains_key(&target) {
                panic!(
                    "group store append for {group_id} returned statuses for {:?} instead of exactly {target}",
                    statuses.keys().collect::<Vec<_>>()
                );
            }
            let status = statuses[&target];
            if status.error.is_error() {
                warn!(
                    "Failed to store metadata for group {group_id} on {target}: {}",
                    status.error
                );
            }
            respond(status.error.group_store_error());
        });

        Ok(PreparedStore {
            partition: offsets_partition,
            batch: RecordBatch {
                compression: self.config.offsets_topic_compression_codec,
                records: vec![LogRecord::new(record_key, value)],
            },
            completion,
        })
    }

    /// Submit a staged append. No lock is held across the hand-off; the
    /// completion runs on the appender's thread.
    pub fn store(&self, prepared: PreparedStore) {
        let PreparedStore {
            partition,
            batch,
            completion,
        } = prepared;
        self.message_store.append(
            self.config.offset_commit_timeout_ms,
            self.config.offset_commit_required_acks,
            true,
            HashMap::from([(partition, batch)]),
            completion,
        );
    }

    // ============================================================================================
    // PARTITION LIFECYCLE
    // ============================================================================================

    /// This broker became the leader of an offsets partition. The partition
    /// serves lookups immediately; a load job rebuilds its cache contents
    /// from the log. At most one load runs per partition.
    pub fn add_partition_ownership(&self, offsets_partition: i32) {
        let schedule_load = {
            let mut ownership = self.ownership.lock();
            ownership.owned.insert(offsets_partition);
            if ownership.loading.contains(&offsets_partition) {
                info!("Offsets partition {offsets_partition} is already loading; ignoring election");
                false
            } else {
                ownership.loading.insert(offsets_partition);
                true
            }
        };

        if schedule_load {
            let manager = self.me.clone();
            self.scheduler.schedule(
                &format!("load-offsets-partition-{offsets_partition}"),
                None,
                Box::new(move || {
                    if let Some(manager) = manager.upgrade() {
                        manager.load_offsets_and_groups(offsets_partition);
                    }
                }),
            );
        }
    }

    /// This broker lost the leadership of an offsets partition. Eviction of
    /// everything routed to the partition happens inside the registry lock,
    /// so a fetch serialized after this call answers `NotCoordinatorForGroup`
    /// rather than observing a half-cleared cache.
    pub fn remove_partition_ownership(&self, offsets_partition: i32) {
        let mut ownership = self.ownership.lock();
        ownership.owned.remove(&offsets_partition);

        let offsets = self
            .cache
            .evict_offsets_where(|group| self.partition_for(group) == offsets_partition);
        let groups = self
            .cache
            .evict_groups_where(|group| self.partition_for(group) == offsets_partition);
        for group in &groups {
            group.lock().transition_to(GroupState::Dead);
        }
        info!(
            "Evicted {} offsets and {} groups for offsets partition {offsets_partition}",
            offsets.len(),
            groups.len()
        );
    }

    #[tracing::instrument(level = "info", skip(self))]
    fn load_offsets_and_groups(&self, offsets_partition: i32) {
        let partition = TopicPartition::new(
            self.config.offsets_topic_name.clone(),
            offsets_partition,
        );
        info!("Loading offsets and group metadata from {partition}");
        let started = Instant::now();

        match self.replay_log(&partition) {
            Ok(()) => info!(
                "Finished loading offsets and group metadata from {partition} in {} milliseconds",
                started.elapsed().as_millis()
            ),
            Err(error) => {
                error!("Aborted loading offsets and group metadata from {partition}: {error}")
            }
        }

        let mut ownership = self.ownership.lock();
        ownership.loading.remove(&offsets_partition);
    }

    fn replay_log(&self, partition: &TopicPartition) -> Result<(), LoadError> {
        let Some(start_offset) = self.message_store.log_start_offset(partition) else {
            warn!("No log found for {partition}; nothing to load");
            return Ok(());
        };

        // The write lock keeps the sweeper out until the partition's state
        // is fully rebuilt. Released before the registry lock is retaken.
        let _expire = self.expire_lock.write();

        let mut current = start_offset;
        while current < self.message_store.high_watermark(partition)
            && !self.shutting_down.load(Ordering::Acquire)
        {
            let records = self
                .message_store
                .read(partition, current, self.config.load_buffer_size)
                .map_err(LoadError::Read)?;
            if records.is_empty() {
                break;
            }

            for stored in records {
                match decode_key(&stored.record.key).map_err(LoadError::Decode)? {
                    RecordKey::Offset(key) => match stored.record.value {
                        Some(value) => {
                            let value =
                                decode_offset_value(&value, self.config.offsets_retention_ms)
                                    .map_err(LoadError::Decode)?;
                            trace!("Loaded offset {} for {}/{}/{}", value.offset, key.group, key.topic, key.partition);
                            self.cache.put_offset(key, value);
                        }
                        None => self.cache.remove_offset(&key),
                    },
                    RecordKey::Group(group_id) => match stored.record.value {
                        Some(value) => {
                            let group = decode_group_value(&group_id, &value)
                                .map_err(LoadError::Decode)?;
                            trace!("Loaded metadata for group {group_id} (generation {})", group.generation_id);
                            self.cache.put_group(group_id, group.into_shared());
                        }
                        None => {
                            if let Some(group) = self.cache.remove_group(&group_id) {
                                group.lock().transition_to(GroupState::Dead);
                            }
                        }
                    },
                }
                current = stored.next_offset;
            }
        }
        Ok(())
    }

    // ============================================================================================
    // EXPIRATION
    // ============================================================================================

    /// Drop every offset whose expiry has passed and append tombstones so
    /// the compactor drops them from the log too. Tombstones need no acks;
    /// a failed partition is retried by a later sweep or the next
    /// coordinator after a reload.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn sweep_expired_offsets(&self) -> usize {
        debug!("Collecting expired offsets");
        let started = Instant::now();

        let _expire = self.expire_lock.write();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let expired = self.cache.take_expired_offsets(now_ms);

        let mut by_partition: HashMap<i32, Vec<LogRecord>> = HashMap::new();
        for (key, _) in expired {
            by_partition
                .entry(self.partition_for(&key.group))
                .or_default()
                .push(LogRecord::tombstone(encode_offset_key(&key)));
        }

        let removed = Arc::new(AtomicUsize::new(0));
        for (offsets_partition, tombstones) in by_partition {
            let count = tombstones.len();
            let partition = TopicPartition::new(
                self.config.offsets_topic_name.clone(),
                offsets_partition,
            );
            let target = partition.clone();
            let counter = Arc::clone(&removed);
            let batch = RecordBatch {
                compression: self.config.offsets_topic_compression_codec,
                records: tombstones,
            };
            self.message_store.append(
                self.config.offset_commit_timeout_ms,
                0,
                true,
                HashMap::from([(partition, batch)]),
                Box::new(move |statuses: HashMap<TopicPartition, AppendStatus>| {
                    match statuses.get(&target) {
                        Some(status) if !status.error.is_error() => {
                            counter.fetch_add(count, Ordering::Relaxed);
                        }
                        Some(status) => warn!(
                            "Failed to append {count} expiration tombstones to {target}: {}",
                            status.error
                        ),
                        None => warn!("Append returned no status for {target}"),
                    }
                }),
            );
        }

        let removed = removed.load(Ordering::Acquire);
        info!(
            "Removed {removed} expired offsets in {} milliseconds",
            started.elapsed().as_millis()
        );
        removed
    }

    // ============================================================================================
    // LIFECYCLE
    // ============================================================================================

    /// Flag the manager as shutting down. In-flight loads stop at the next
    /// record boundary; in-flight appends complete and their callbacks are
    /// safe against the caches being dropped afterwards.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        info!("Shutting down group metadata manager");
    }
}
