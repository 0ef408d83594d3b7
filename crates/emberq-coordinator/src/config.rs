use serde::{Deserialize, Serialize};

/// Compression codec identifier handed through to the storage layer's batch
/// builder. `0` means no compression.
pub type CompressionCodec = u8;

/// Configuration for the group and offset metadata manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Name of the internal compacted topic that persists commits and group
    /// metadata.
    pub offsets_topic_name: String,
    /// Partition count used when the topic directory does not know the
    /// offsets topic yet. Must be at least 1.
    pub offsets_topic_num_partitions: u32,
    pub offsets_topic_compression_codec: CompressionCodec,
    /// Timeout handed to the appender for commit and group-store appends.
    pub offset_commit_timeout_ms: u64,
    pub offset_commit_required_acks: i16,
    /// Upper bound on the bytes read per batch when rebuilding a partition's
    /// cache from its log.
    pub load_buffer_size: usize,
    /// Retention applied to records that carry no explicit expiry.
    pub offsets_retention_ms: i64,
    pub offsets_retention_check_interval_ms: u64,
    /// Maximum accepted length of the per-offset metadata string.
    pub max_metadata_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            offsets_topic_name: "__consumer_offsets".to_string(),
            offsets_topic_num_partitions: 50,
            offsets_topic_compression_codec: 0,
            offset_commit_timeout_ms: 5_000,
            offset_commit_required_acks: -1,
            load_buffer_size: 5 * 1024 * 1024,
            offsets_retention_ms: 24 * 60 * 60 * 1000, // one day
            offsets_retention_check_interval_ms: 600_000,
            max_metadata_size: 4096,
        }
    }
}
