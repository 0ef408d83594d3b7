//! In-memory collaborators.
//!
//! `MemoryMessageStore` keeps one `Vec` per partition and acknowledges
//! appends inline, the way a local leader with no followers would.
//! `InlineScheduler` runs one-shot tasks on the calling thread and parks
//! periodic tasks for manual firing. Both are first-class implementations:
//! integration tests and single-node embeddings use them directly.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::ErrorCode;
use crate::store::{
    AppendCompletion, AppendStatus, LogRecord, MessageStore, RecordBatch, Scheduler, StoredRecord,
    TopicDirectory, TopicPartition,
};

#[derive(Debug, Default)]
struct PartitionLog {
    records: Vec<LogRecord>,
    leader_local: bool,
}

/// In-memory [`MessageStore`] with adjustable failure and leadership state.
#[derive(Default)]
pub struct MemoryMessageStore {
    logs: DashMap<TopicPartition, PartitionLog>,
    append_error: Mutex<Option<ErrorCode>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty leader-local log for the partition.
    pub fn create_partition(&self, partition: TopicPartition) {
        self.logs.entry(partition).or_insert_with(|| PartitionLog {
            records: Vec::new(),
            leader_local: true,
        });
    }

    /// Append records directly, bypassing the appender path. Used to stage
    /// log contents that a coordinator will replay.
    pub fn seed(&self, partition: TopicPartition, records: Vec<LogRecord>) {
        let mut log = self.logs.entry(partition).or_insert_with(|| PartitionLog {
            records: Vec::new(),
            leader_local: true,
        });
        log.records.extend(records);
    }

    /// Drop the leader replica for the partition; its high watermark reads
    /// as `-1` afterwards.
    pub fn resign_leadership(&self, partition: &TopicPartition) {
        if let Some(mut log) = self.logs.get_mut(partition) {
            log.leader_local = false;
        }
    }

    /// Fail every subsequent append with `error` until cleared with `None`.
    pub fn set_append_error(&self, error: Option<ErrorCode>) {
        *self.append_error.lock() = error;
    }

    /// Snapshot of everything appended to the partition.
    pub fn records(&self, partition: &TopicPartition) -> Vec<LogRecord> {
        self.logs
            .get(partition)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn log_start_offset(&self, partition: &TopicPartition) -> Option<i64> {
        self.logs.get(partition).map(|_| 0)
    }

    fn high_watermark(&self, partition: &TopicPartition) -> i64 {
        match self.logs.get(partition) {
            Some(log) if log.leader_local => log.records.len() as i64,
            _ => -1,
        }
    }

    fn read(
        &self,
        partition: &TopicPartition,
        offset: i64,
        max_bytes: usize,
    ) -> Result<Vec<StoredRecord>, ErrorCode> {
        let log = self
            .logs
            .get(partition)
            .ok_or(ErrorCode::UnknownTopicOrPartition)?;
        if offset < 0 {
            return Err(ErrorCode::InvalidFetchSize);
        }

        let mut out = Vec::new();
        let mut bytes = 0;
        for (index, record) in log.records.iter().enumerate().skip(offset as usize) {
            bytes += record.size_bytes();
            if !out.is_empty() && bytes > max_bytes {
                break;
            }
            out.push(StoredRecord {
                offset: index as i64,
                next_offset: index as i64 + 1,
                record: record.clone(),
            });
        }
        Ok(out)
    }

    fn append(
        &self,
        _timeout_ms: u64,
        _required_acks: i16,
        _internal_topics_allowed: bool,
        batches: HashMap<TopicPartition, RecordBatch>,
        completion: AppendCompletion,
    ) {
        let forced_error = *self.append_error.lock();
        let mut statuses = HashMap::with_capacity(batches.len());
        for (partition, batch) in batches {
            let status = match forced_error {
                Some(error) => AppendStatus::failed(error),
                None => match self.logs.get_mut(&partition) {
                    Some(mut log) => {
                        log.records.extend(batch.records);
                        AppendStatus::ok()
                    }
                    None => AppendStatus::failed(ErrorCode::UnknownTopicOrPartition),
                },
            };
            statuses.insert(partition, status);
        }
        completion(statuses);
    }
}

/// Directory over a fixed topic → partition-count table.
#[derive(Debug, Default)]
pub struct StaticTopicDirectory {
    topics: HashMap<String, u32>,
}

impl StaticTopicDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: impl Into<String>, partitions: u32) -> Self {
        self.topics.insert(topic.into(), partitions);
        self
    }
}

impl TopicDirectory for StaticTopicDirectory {
    fn partition_count(&self, topic: &str) -> Option<u32> {
        self.topics.get(topic).copied()
    }
}

type ScheduledTask = Box<dyn Fn() + Send + Sync>;

/// Scheduler that runs one-shot tasks inline and keeps periodic tasks for
/// the caller to fire.
#[derive(Default)]
pub struct InlineScheduler {
    periodic: Mutex<Vec<(String, u64, ScheduledTask)>>,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every periodic task registered under `name` once.
    pub fn fire(&self, name: &str) -> usize {
        let tasks = self.periodic.lock();
        let mut fired = 0;
        for (task_name, _, task) in tasks.iter() {
            if task_name == name {
                task();
                fired += 1;
            }
        }
        fired
    }

    pub fn task_names(&self) -> Vec<String> {
        self.periodic
            .lock()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, name: &str, period_ms: Option<u64>, task: Box<dyn Fn() + Send + Sync>) {
        match period_ms {
            None => task(),
            Some(period) => {
                self.periodic
                    .lock()
                    .push((name.to_string(), period, task));
            }
        }
    }
}
