//! Consumer coordination metadata for the EmberQ broker.
//!
//! This crate owns the broker-side bookkeeping for consumer groups: the
//! in-memory caches of group metadata and committed offsets, the compacted
//! offsets-topic records that make them durable, the per-partition
//! leadership lifecycle, and the periodic expiration of stale offsets. The
//! membership protocol, replication, and the wire protocol live elsewhere
//! and reach in through the traits in [`store`].

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod group;
pub mod locks;
pub mod manager;
pub mod metrics;
pub mod store;

pub use codec::{OffsetKey, OffsetValue, DEFAULT_EXPIRE_TIMESTAMP};
pub use config::CoordinatorConfig;
pub use error::{CodecError, ErrorCode};
pub use group::{GroupMetadata, GroupState, MemberMetadata, SharedGroup};
pub use manager::{GroupMetadataManager, OffsetFetchStatus, PreparedStore, INVALID_OFFSET};
pub use store::{MessageStore, Scheduler, TopicDirectory, TopicPartition};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
