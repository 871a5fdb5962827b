//! On-disk record format for the append-only log.
//!
//! # Record Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Offset  │  Size  │  Description                    │
//! ├─────────────────────────────────────────────────────┤
//! │  0       │  4     │  Magic bytes: "KVL1" (u32 LE)   │
//! │  4       │  1     │  Version: 0x01                  │
//! │  5       │  1     │  Opcode: 1 = SET, 2 = DEL       │
//! │  6       │  2     │  Reserved (zero)                │
//! │  8       │  8     │  Sequence number (u64 LE)       │
//! │  16      │  4     │  Key length (u32 LE)            │
//! │  20      │  4     │  Value length (u32 LE, 0 = DEL) │
//! │  24      │  4     │  CRC-32 of [4..24) ∥ key ∥ value│
//! │  28      │  klen  │  Key bytes                      │
//! │  28+klen │  vlen  │  Value bytes (absent for DEL)   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The magic is excluded from the CRC so a scanner can identify frame
//! boundaries before committing to a checksum. Sequence numbers are
//! strictly increasing across the lifetime of the store, restarts included.

use marcasite_crypto::Crc32;
use marcasite_types::Opcode;

use crate::codec;
use crate::error::StoreError;

/// Magic bytes identifying a record header ("KVL1" read little-endian).
pub(crate) const MAGIC: u32 = 0x314C_564B;

/// Current record format version.
pub(crate) const VERSION: u8 = 0x01;

// Byte sizes - typed constants keep the offsets below honest
const MAGIC_SIZE: usize = 4;
const VERSION_SIZE: usize = 1;
const OPCODE_SIZE: usize = 1;
const RESERVED_SIZE: usize = 2;
const SEQ_SIZE: usize = 8;
const KLEN_SIZE: usize = 4;
const VLEN_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

// Field offsets within the header
const VERSION_AT: usize = MAGIC_SIZE;
const OPCODE_AT: usize = VERSION_AT + VERSION_SIZE;
const SEQ_AT: usize = OPCODE_AT + OPCODE_SIZE + RESERVED_SIZE;
const KLEN_AT: usize = SEQ_AT + SEQ_SIZE;
const VLEN_AT: usize = KLEN_AT + KLEN_SIZE;
const CRC_AT: usize = VLEN_AT + VLEN_SIZE;

/// Header size: everything before the key (28 bytes).
pub(crate) const HEADER_SIZE: usize = CRC_AT + CRC_SIZE;

/// The checksum covers header bytes [4..24) — everything after the magic,
/// before the CRC field itself — followed by the key and value bytes.
const CRC_COVERED: std::ops::Range<usize> = MAGIC_SIZE..CRC_AT;

/// Decoded record header fields.
///
/// `opcode` is the raw on-disk byte: the recovery scan needs to see unknown
/// opcodes to know where to stop, so validation is left to the caller.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    pub magic: u32,
    pub version: u8,
    pub opcode: u8,
    pub seq: u64,
    pub klen: u32,
    pub vlen: u32,
    pub crc: u32,
}

impl RecordHeader {
    /// Decodes the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// Panics if `buf` is shorter; callers check sizes first.
    pub(crate) fn parse(buf: &[u8]) -> Self {
        Self {
            magic: codec::get_u32(buf, 0),
            version: buf[VERSION_AT],
            opcode: buf[OPCODE_AT],
            seq: codec::get_u64(buf, SEQ_AT),
            klen: codec::get_u32(buf, KLEN_AT),
            vlen: codec::get_u32(buf, VLEN_AT),
            crc: codec::get_u32(buf, CRC_AT),
        }
    }

    /// Total encoded size of the record this header describes.
    pub(crate) fn record_size(&self) -> u64 {
        HEADER_SIZE as u64 + u64::from(self.klen) + u64::from(self.vlen)
    }
}

/// Encodes one complete record, checksum included.
///
/// DEL records carry no value; callers pass an empty slice.
pub(crate) fn encode(
    op: Opcode,
    seq: u64,
    key: &[u8],
    value: &[u8],
) -> Result<Vec<u8>, StoreError> {
    debug_assert!(
        op == Opcode::Set || value.is_empty(),
        "tombstones carry no value"
    );

    let klen = u32::try_from(key.len()).map_err(|_| StoreError::KeyTooLarge { len: key.len() })?;
    let vlen =
        u32::try_from(value.len()).map_err(|_| StoreError::ValueTooLarge { len: value.len() })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + key.len() + value.len());
    codec::put_u32(&mut buf, MAGIC);
    buf.push(VERSION);
    buf.push(op.as_byte());
    buf.extend_from_slice(&[0u8; RESERVED_SIZE]);
    codec::put_u64(&mut buf, seq);
    codec::put_u32(&mut buf, klen);
    codec::put_u32(&mut buf, vlen);

    let mut crc = Crc32::new();
    crc.update(&buf[CRC_COVERED]);
    crc.update(key);
    crc.update(value);
    codec::put_u32(&mut buf, crc.finalize());

    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    Ok(buf)
}

/// Recomputes the checksum for a record whose header and body sit in one
/// buffer, as during a recovery scan. `body` is the key and value bytes.
pub(crate) fn checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(&header[CRC_COVERED]);
    crc.update(body);
    crc.finalize()
}
