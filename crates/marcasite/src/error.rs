//! Store error types.

use marcasite_io::IoError;
use marcasite_types::SegmentId;

/// Errors surfaced by store operations.
///
/// Corruption discovered during a recovery scan is *not* represented here:
/// scans recover locally by truncating the segment at the first bad record.
/// These variants cover the active read/write path, where damage means the
/// index and the log disagree.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying file I/O failure.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: IoError,
    },

    /// A point read landed on bytes that are not a record header.
    #[error("bad record magic in segment {segment} at offset {offset}: found {actual:#010x}")]
    BadRecordMagic {
        segment: SegmentId,
        offset: u64,
        actual: u32,
    },

    /// A point read expected a SET record and found something else.
    #[error("record in segment {segment} at offset {offset} is not a SET (opcode {opcode:#04x})")]
    NotASetRecord {
        segment: SegmentId,
        offset: u64,
        opcode: u8,
    },

    /// Key length does not fit the record format's 32-bit length field.
    #[error("key of {len} bytes exceeds the record format limit")]
    KeyTooLarge { len: usize },

    /// Value length does not fit the record format's 32-bit length field.
    #[error("value of {len} bytes exceeds the record format limit")]
    ValueTooLarge { len: usize },

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned by a panicked writer")]
    LockPoisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source: source.into(),
        }
    }
}
