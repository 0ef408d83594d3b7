//! Seams to the rest of the broker.
//!
//! The coordinator does not own the offsets-topic log, the task scheduler,
//! or topic discovery; it reaches them through these traits. The broker
//! wires in its replication engine; [`memory`] supplies in-process
//! implementations for embedding and tests.

pub mod memory;

use std::collections::HashMap;
use std::fmt;

use crate::config::CompressionCodec;
use crate::error::ErrorCode;

/// A topic name plus partition id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A key/value record destined for a compacted log. A record without a
/// value is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl LogRecord {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    pub fn tombstone(key: Vec<u8>) -> Self {
        Self { key, value: None }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Approximate wire size, used to honor read buffer limits.
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, Vec::len) + 16
    }
}

/// Records handed to the appender for one partition, with the compression
/// the batch builder should apply.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub compression: CompressionCodec,
    pub records: Vec<LogRecord>,
}

/// A record read back from a log, positioned within the partition.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub offset: i64,
    pub next_offset: i64,
    pub record: LogRecord,
}

/// Per-partition outcome of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendStatus {
    pub error: ErrorCode,
}

impl AppendStatus {
    pub fn ok() -> Self {
        Self {
            error: ErrorCode::None,
        }
    }

    pub fn failed(error: ErrorCode) -> Self {
        Self { error }
    }
}

/// Completion callback for an append; runs on the appender's thread once
/// the batches are accepted or rejected.
pub type AppendCompletion = Box<dyn FnOnce(HashMap<TopicPartition, AppendStatus>) + Send>;

/// The broker's replicated log, as far as the coordinator needs it.
pub trait MessageStore: Send + Sync {
    /// Base offset of the first retained segment, or `None` when no log
    /// exists for the partition.
    fn log_start_offset(&self, partition: &TopicPartition) -> Option<i64>;

    /// The partition's fully replicated offset, or `-1` when this broker
    /// holds no leader replica for it.
    fn high_watermark(&self, partition: &TopicPartition) -> i64;

    /// Read records starting at `offset`, bounded by `max_bytes` (always at
    /// least one record when any exists below the high watermark).
    fn read(
        &self,
        partition: &TopicPartition,
        offset: i64,
        max_bytes: usize,
    ) -> Result<Vec<StoredRecord>, ErrorCode>;

    /// Hand batches to the replication engine. Must not block the caller on
    /// replication; `completion` is invoked exactly once with a status per
    /// submitted partition.
    fn append(
        &self,
        timeout_ms: u64,
        required_acks: i16,
        internal_topics_allowed: bool,
        batches: HashMap<TopicPartition, RecordBatch>,
        completion: AppendCompletion,
    );
}

/// Topic discovery, backed by the cluster's naming service.
pub trait TopicDirectory: Send + Sync {
    /// Partition count of `topic`, or `None` when the topic does not exist.
    fn partition_count(&self, topic: &str) -> Option<u32>;
}

/// The broker's background task executor. `period_ms: None` schedules a
/// one-shot task.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, name: &str, period_ms: Option<u64>, task: Box<dyn Fn() + Send + Sync>);
}
