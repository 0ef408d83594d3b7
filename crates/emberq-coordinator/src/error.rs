use std::fmt;

/// Per-partition response and storage codes exchanged with collaborators.
///
/// A single flat enum covers both the codes this crate reports to callers
/// (commit/fetch/group-store outcomes) and the codes the storage layer
/// reports for appends and reads, so translation is a total code-to-code
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    GroupCoordinatorNotAvailable,
    NotCoordinatorForGroup,
    InvalidCommitOffsetSize,
    OffsetMetadataTooLarge,
    Unknown,
    /// Absence marker for a fetch of an uncommitted partition. Not an error.
    NoOffset,
    UnknownTopicOrPartition,
    NotLeaderForPartition,
    MessageSizeTooLarge,
    MessageSetSizeTooLarge,
    InvalidFetchSize,
}

impl ErrorCode {
    /// Translate a storage append code into the code reported for an offset
    /// commit.
    pub fn offset_commit_error(self) -> ErrorCode {
        match self {
            ErrorCode::UnknownTopicOrPartition => ErrorCode::GroupCoordinatorNotAvailable,
            ErrorCode::NotLeaderForPartition => ErrorCode::NotCoordinatorForGroup,
            ErrorCode::MessageSizeTooLarge
            | ErrorCode::MessageSetSizeTooLarge
            | ErrorCode::InvalidFetchSize => ErrorCode::InvalidCommitOffsetSize,
            other => other,
        }
    }

    /// Translate a storage append code into the code reported for a group
    /// metadata store.
    pub fn group_store_error(self) -> ErrorCode {
        match self {
            ErrorCode::UnknownTopicOrPartition => ErrorCode::GroupCoordinatorNotAvailable,
            ErrorCode::NotLeaderForPartition => ErrorCode::NotCoordinatorForGroup,
            ErrorCode::MessageSizeTooLarge
            | ErrorCode::MessageSetSizeTooLarge
            | ErrorCode::InvalidFetchSize => ErrorCode::Unknown,
            other => other,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ErrorCode::None | ErrorCode::NoOffset)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::None => write!(f, "no error"),
            ErrorCode::GroupCoordinatorNotAvailable => {
                write!(f, "the group coordinator is not available")
            }
            ErrorCode::NotCoordinatorForGroup => {
                write!(f, "this broker is not the coordinator for the group")
            }
            ErrorCode::InvalidCommitOffsetSize => {
                write!(f, "the committed offset record is invalidly sized")
            }
            ErrorCode::OffsetMetadataTooLarge => {
                write!(f, "the offset metadata exceeds the maximum size")
            }
            ErrorCode::Unknown => write!(f, "unexpected server error"),
            ErrorCode::NoOffset => write!(f, "no offset is committed for the partition"),
            ErrorCode::UnknownTopicOrPartition => write!(f, "unknown topic or partition"),
            ErrorCode::NotLeaderForPartition => {
                write!(f, "this broker is not the leader for the partition")
            }
            ErrorCode::MessageSizeTooLarge => write!(f, "message size too large"),
            ErrorCode::MessageSetSizeTooLarge => write!(f, "message set size too large"),
            ErrorCode::InvalidFetchSize => write!(f, "invalid fetch size"),
        }
    }
}

/// Errors raised while encoding or decoding offsets-topic records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Truncated {
        field: &'static str,
    },
    InvalidUtf8 {
        field: &'static str,
    },
    InvalidLength {
        field: &'static str,
        length: i32,
    },
    UnknownVersion {
        version: u16,
    },
    TrailingBytes {
        remaining: usize,
    },
    /// A member carries no metadata for the group's selected protocol.
    MissingProtocolMetadata {
        member_id: String,
        protocol: String,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated { field } => {
                write!(f, "record truncated while reading {field}")
            }
            CodecError::InvalidUtf8 { field } => {
                write!(f, "field {field} is not valid UTF-8")
            }
            CodecError::InvalidLength { field, length } => {
                write!(f, "field {field} has invalid length {length}")
            }
            CodecError::UnknownVersion { version } => {
                write!(f, "unknown schema version {version}")
            }
            CodecError::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after record payload")
            }
            CodecError::MissingProtocolMetadata { member_id, protocol } => {
                write!(
                    f,
                    "member {member_id} has no metadata for selected protocol {protocol}"
                )
            }
        }
    }
}

impl std::error::Error for CodecError {}
