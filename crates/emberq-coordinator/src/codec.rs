//! Versioned binary schemas for offsets-topic records.
//!
//! Every key and value starts with a big-endian `u16` schema version. Keys
//! are stable per logical entry so the log compactor retains the latest
//! value for each; a record with a key and no value is a tombstone.
//!
//! ```text
//! Offset key (v0, v1):   [u16 version][str group][str topic][i32 partition]
//! Group key  (v2):       [u16 version][str group]
//! Offset value (v0):     [u16 version][i64 offset][str metadata][i64 timestamp]
//! Offset value (v1):     [u16 version][i64 offset][str metadata]
//!                        [i64 commit_timestamp][i64 expire_timestamp]
//! Group value  (v0):     [u16 version][str protocol_type][i32 generation]
//!                        [nstr protocol][nstr leader][i32 count][member...]
//! Member:                [str member_id][str client_id][str client_host]
//!                        [i32 session_timeout][bytes subscription][bytes assignment]
//! ```
//!
//! `str` is an `i16` length prefix followed by UTF-8 bytes, `nstr` allows a
//! `-1` prefix for null, and `bytes` is an `i32` length prefix.

use std::collections::HashMap;

use crate::error::CodecError;
use crate::group::{GroupMetadata, MemberMetadata};

const OFFSET_KEY_V0: u16 = 0;
const OFFSET_KEY_V1: u16 = 1;
const GROUP_KEY_VERSION: u16 = 2;

const OFFSET_VALUE_V0: u16 = 0;
const OFFSET_VALUE_V1: u16 = 1;
const GROUP_VALUE_VERSION: u16 = 0;

/// Written offset keys use the v1 schema; v0 remains readable.
const CURRENT_OFFSET_KEY_VERSION: u16 = OFFSET_KEY_V1;

/// Sentinel for "no explicit expiry" in v1 offset values. Readers replace it
/// with `commit_timestamp + retention_ms`. The value is part of the on-disk
/// format and must be preserved bit-exactly.
pub const DEFAULT_EXPIRE_TIMESTAMP: i64 = -1;

/// Identifier of one committed offset: the group, and the consumed
/// topic-partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffsetKey {
    pub group: String,
    pub topic: String,
    pub partition: i32,
}

impl OffsetKey {
    pub fn new(group: impl Into<String>, topic: impl Into<String>, partition: i32) -> Self {
        Self {
            group: group.into(),
            topic: topic.into(),
            partition,
        }
    }
}

/// The last committed position of a group on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetValue {
    pub offset: i64,
    pub metadata: String,
    pub commit_timestamp: i64,
    pub expire_timestamp: i64,
}

impl OffsetValue {
    pub fn new(
        offset: i64,
        metadata: impl Into<String>,
        commit_timestamp: i64,
        expire_timestamp: i64,
    ) -> Self {
        Self {
            offset,
            metadata: metadata.into(),
            commit_timestamp,
            expire_timestamp,
        }
    }
}

/// A decoded offsets-topic key, dispatched on the schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Offset(OffsetKey),
    Group(String),
}

// ================================================================================================
// ENCODING
// ================================================================================================

pub fn encode_offset_key(key: &OffsetKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 2 + key.group.len() + 2 + key.topic.len() + 4);
    write_u16(&mut out, CURRENT_OFFSET_KEY_VERSION);
    write_string(&mut out, &key.group);
    write_string(&mut out, &key.topic);
    write_i32(&mut out, key.partition);
    out
}

pub fn encode_group_key(group: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 2 + group.len());
    write_u16(&mut out, GROUP_KEY_VERSION);
    write_string(&mut out, group);
    out
}

/// Offset values are always written at v1.
pub fn encode_offset_value(value: &OffsetValue) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 8 + 2 + value.metadata.len() + 8 + 8);
    write_u16(&mut out, OFFSET_VALUE_V1);
    write_i64(&mut out, value.offset);
    write_string(&mut out, &value.metadata);
    write_i64(&mut out, value.commit_timestamp);
    write_i64(&mut out, value.expire_timestamp);
    out
}

/// Encode a group's metadata together with the per-member assignments chosen
/// by the group leader. Each member's subscription bytes are the metadata it
/// registered for the group's currently selected protocol.
pub fn encode_group_value(
    group: &GroupMetadata,
    assignment: &HashMap<String, Vec<u8>>,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    write_u16(&mut out, GROUP_VALUE_VERSION);
    write_string(&mut out, &group.protocol_type);
    write_i32(&mut out, group.generation_id);
    write_nullable_string(&mut out, group.protocol.as_deref());
    write_nullable_string(&mut out, group.leader_id.as_deref());

    let members = group.all_member_metadata();
    write_i32(&mut out, members.len() as i32);
    for member in members {
        let subscription = match group.protocol.as_deref() {
            Some(protocol) => {
                member
                    .metadata(protocol)
                    .ok_or_else(|| CodecError::MissingProtocolMetadata {
                        member_id: member.member_id.clone(),
                        protocol: protocol.to_string(),
                    })?
            }
            None => &[][..],
        };
        let assigned = assignment
            .get(&member.member_id)
            .map(Vec::as_slice)
            .unwrap_or(&member.assignment);

        write_string(&mut out, &member.member_id);
        write_string(&mut out, &member.client_id);
        write_string(&mut out, &member.client_host);
        write_i32(&mut out, member.session_timeout_ms);
        write_bytes(&mut out, subscription);
        write_bytes(&mut out, assigned);
    }
    Ok(out)
}

// ================================================================================================
// DECODING
// ================================================================================================

pub fn decode_key(buf: &[u8]) -> Result<RecordKey, CodecError> {
    let mut reader = ByteReader::new(buf);
    let version = reader.read_u16("key version")?;
    let key = match version {
        OFFSET_KEY_V0 | OFFSET_KEY_V1 => {
            let group = reader.read_string("group")?;
            let topic = reader.read_string("topic")?;
            let partition = reader.read_i32("partition")?;
            RecordKey::Offset(OffsetKey {
                group,
                topic,
                partition,
            })
        }
        GROUP_KEY_VERSION => RecordKey::Group(reader.read_string("group")?),
        version => return Err(CodecError::UnknownVersion { version }),
    };
    reader.finish()?;
    Ok(key)
}

/// Decode an offset value. `retention_ms` supplies the expiry for v0 records
/// and for v1 records carrying the [`DEFAULT_EXPIRE_TIMESTAMP`] sentinel.
pub fn decode_offset_value(buf: &[u8], retention_ms: i64) -> Result<OffsetValue, CodecError> {
    let mut reader = ByteReader::new(buf);
    let version = reader.read_u16("value version")?;
    let value = match version {
        OFFSET_VALUE_V0 => {
            let offset = reader.read_i64("offset")?;
            let metadata = reader.read_string("metadata")?;
            let timestamp = reader.read_i64("timestamp")?;
            OffsetValue {
                offset,
                metadata,
                commit_timestamp: timestamp,
                expire_timestamp: timestamp + retention_ms,
            }
        }
        OFFSET_VALUE_V1 => {
            let offset = reader.read_i64("offset")?;
            let metadata = reader.read_string("metadata")?;
            let commit_timestamp = reader.read_i64("commit_timestamp")?;
            let expire_timestamp = match reader.read_i64("expire_timestamp")? {
                DEFAULT_EXPIRE_TIMESTAMP => commit_timestamp + retention_ms,
                explicit => explicit,
            };
            OffsetValue {
                offset,
                metadata,
                commit_timestamp,
                expire_timestamp,
            }
        }
        version => return Err(CodecError::UnknownVersion { version }),
    };
    reader.finish()?;
    Ok(value)
}

/// Decode a group value. The group id comes from the record key; the value
/// schema does not repeat it.
pub fn decode_group_value(group_id: &str, buf: &[u8]) -> Result<GroupMetadata, CodecError> {
    let mut reader = ByteReader::new(buf);
    let version = reader.read_u16("value version")?;
    if version != GROUP_VALUE_VERSION {
        return Err(CodecError::UnknownVersion { version });
    }

    let protocol_type = reader.read_string("protocol_type")?;
    let generation_id = reader.read_i32("generation")?;
    let protocol = reader.read_nullable_string("protocol")?;
    let leader_id = reader.read_nullable_string("leader")?;

    let mut group = GroupMetadata::new(group_id, protocol_type);
    group.generation_id = generation_id;
    group.protocol = protocol.clone();
    group.leader_id = leader_id;

    let member_count = reader.read_i32("member count")?;
    if member_count < 0 {
        return Err(CodecError::InvalidLength {
            field: "member count",
            length: member_count,
        });
    }
    for _ in 0..member_count {
        let member_id = reader.read_string("member_id")?;
        let client_id = reader.read_string("client_id")?;
        let client_host = reader.read_string("client_host")?;
        let session_timeout_ms = reader.read_i32("session_timeout")?;
        let subscription = reader.read_bytes("subscription")?;
        let assignment = reader.read_bytes("assignment")?;

        let supported = match &protocol {
            Some(protocol) => vec![(protocol.clone(), subscription)],
            None => Vec::new(),
        };
        let mut member = MemberMetadata::new(
            member_id.clone(),
            client_id,
            client_host,
            session_timeout_ms,
            supported,
        );
        member.assignment = assignment;
        group.add(member_id, member);
    }
    reader.finish()?;
    Ok(group)
}

// ================================================================================================
// WIRE PRIMITIVES
// ================================================================================================

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    debug_assert!(value.len() <= i16::MAX as usize, "string field too long");
    write_i16(out, value.len() as i16);
    out.extend_from_slice(value.as_bytes());
}

fn write_nullable_string(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(value) => write_string(out, value),
        None => write_i16(out, -1),
    }
}

fn write_bytes(out: &mut Vec<u8>, value: &[u8]) {
    write_i32(out, value.len() as i32);
    out.extend_from_slice(value);
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.buf.len() - self.pos < len {
            return Err(CodecError::Truncated { field });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_i16(&mut self, field: &'static str) -> Result<i16, CodecError> {
        let bytes = self.take(2, field)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_i32(&mut self, field: &'static str) -> Result<i32, CodecError> {
        let bytes = self.take(4, field)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i64(&mut self, field: &'static str) -> Result<i64, CodecError> {
        let bytes = self.take(8, field)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.read_i16(field)?;
        if len < 0 {
            return Err(CodecError::InvalidLength {
                field,
                length: len as i32,
            });
        }
        let bytes = self.take(len as usize, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    fn read_nullable_string(&mut self, field: &'static str) -> Result<Option<String>, CodecError> {
        let len = self.read_i16(field)?;
        if len == -1 {
            return Ok(None);
        }
        if len < -1 {
            return Err(CodecError::InvalidLength {
                field,
                length: len as i32,
            });
        }
        let bytes = self.take(len as usize, field)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| CodecError::InvalidUtf8 { field })
    }

    fn read_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, CodecError> {
        let len = self.read_i32(field)?;
        if len < 0 {
            return Err(CodecError::InvalidLength { field, length: len });
        }
        Ok(self.take(len as usize, field)?.to_vec())
    }

    fn finish(&self) -> Result<(), CodecError> {
        if self.pos != self.buf.len() {
            return Err(CodecError::TrailingBytes {
                remaining: self.buf.len() - self.pos,
            });
        }
        Ok(())
    }
}
