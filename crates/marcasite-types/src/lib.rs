//! # marcasite-types: Core types for Marcasite
//!
//! This crate contains the shared value types used across the Marcasite
//! engine:
//! - Segment identity ([`SegmentId`])
//! - Record opcodes ([`Opcode`])
//! - Index payloads ([`Location`])
//! - Store configuration ([`StoreConfig`])
//!
//! All types here are plain values. Index entries hold [`Location`]s by
//! value, never references into segments, so segment teardown during
//! compaction needs no pointer chasing.

use std::fmt::Display;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default soft upper bound for the active segment before rolling (64 MiB).
pub const DEFAULT_SEGMENT_MAX_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// Segment identity
// ============================================================================

/// Unique identifier for a log segment within one data directory.
///
/// Segment ids are allocated monotonically; the active segment is always the
/// one with the largest id. Rendered in filenames as a zero-padded six-digit
/// decimal (`000001.log`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(u32);

impl SegmentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// The id of the segment created in an empty data directory.
    pub const FIRST: SegmentId = SegmentId(1);

    /// The id the next segment roll will allocate.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl From<u32> for SegmentId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<SegmentId> for u32 {
    fn from(id: SegmentId) -> Self {
        id.0
    }
}

// ============================================================================
// Record opcodes
// ============================================================================

/// Operation encoded in a log record.
///
/// The on-disk byte values are part of the record format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// A key/value write.
    Set = 1,
    /// A deletion marker (tombstone); carries no value.
    Del = 2,
}

impl Opcode {
    /// Returns the on-disk byte for this opcode.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses an on-disk opcode byte. Returns `None` for unknown bytes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Set),
            2 => Some(Self::Del),
            _ => None,
        }
    }

    /// Returns `true` for the tombstone opcode.
    pub fn is_tombstone(self) -> bool {
        matches!(self, Self::Del)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Set => write!(f, "SET"),
            Self::Del => write!(f, "DEL"),
        }
    }
}

// ============================================================================
// Locations
// ============================================================================

/// Pointer to one record within one segment.
///
/// This is the payload of an in-memory index entry: enough to find the
/// record on disk (`segment`, `offset`, `record_size`), order it against
/// other writes of the same key (`seq`), and suppress reads of deleted keys
/// (`tombstone`) until compaction drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Segment holding the record.
    pub segment: SegmentId,
    /// Byte offset of the record header within the segment.
    pub offset: u64,
    /// Total encoded record size in bytes (header + key + value).
    pub record_size: u32,
    /// Sequence number the record was written with.
    pub seq: u64,
    /// `true` if the record is a DEL tombstone.
    pub tombstone: bool,
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for opening a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding segments and hint files. Created if missing.
    pub data_dir: PathBuf,
    /// Soft upper bound for the active segment before rolling. One
    /// over-the-limit record may be appended before the next roll.
    pub segment_max_bytes: u64,
    /// If `true`, every put/delete/compaction append is flushed to stable
    /// storage before the operation returns.
    pub fsync_each_write: bool,
}

impl StoreConfig {
    /// Creates a configuration with the given data directory and defaults
    /// for everything else (64 MiB segments, fsync on every write).
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            segment_max_bytes: DEFAULT_SEGMENT_MAX_BYTES,
            fsync_each_write: true,
        }
    }

    /// Sets the segment roll threshold.
    pub fn with_segment_max_bytes(mut self, bytes: u64) -> Self {
        self.segment_max_bytes = bytes;
        self
    }

    /// Enables or disables fsync-per-write durability.
    pub fn with_fsync_each_write(mut self, fsync: bool) -> Self {
        self.fsync_each_write = fsync;
        self
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn segment_id_renders_zero_padded() {
        assert_eq!(SegmentId::new(1).to_string(), "000001");
        assert_eq!(SegmentId::new(123_456).to_string(), "123456");
    }

    #[test]
    fn segment_id_next_increments() {
        assert_eq!(SegmentId::FIRST.next(), SegmentId::new(2));
    }

    #[test_case(1, Some(Opcode::Set); "set byte")]
    #[test_case(2, Some(Opcode::Del); "del byte")]
    #[test_case(0, None; "zero is invalid")]
    #[test_case(3, None; "unknown byte")]
    fn opcode_from_byte(byte: u8, expected: Option<Opcode>) {
        assert_eq!(Opcode::from_byte(byte), expected);
    }

    #[test]
    fn opcode_roundtrips_through_byte() {
        for op in [Opcode::Set, Opcode::Del] {
            assert_eq!(Opcode::from_byte(op.as_byte()), Some(op));
        }
    }

    #[test]
    fn config_defaults() {
        let config = StoreConfig::new("/tmp/data");
        assert_eq!(config.segment_max_bytes, DEFAULT_SEGMENT_MAX_BYTES);
        assert!(config.fsync_each_write);
    }

    #[test]
    fn config_builders() {
        let config = StoreConfig::new("/tmp/data")
            .with_segment_max_bytes(64)
            .with_fsync_each_write(false);
        assert_eq!(config.segment_max_bytes, 64);
        assert!(!config.fsync_each_write);
    }
}
