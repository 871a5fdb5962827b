//! Hint files: per-segment bootstrap accelerators.
//!
//! A hint file sits beside its segment as `NNNNNN.hint` and records the
//! final [`Location`] of each key appearing in that segment, so bootstrap
//! can ingest a segment without replaying its log. Hints are advisory:
//! deleting one while the store is down costs a rescan, nothing more.
//!
//! # File Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │  Offset  │  Size  │  Description                   │
//! ├────────────────────────────────────────────────────┤
//! │  0       │  4     │  Magic bytes: "HNT1" (u32 LE)  │
//! │  4       │  1     │  Version: 0x01                 │
//! │  5       │  4     │  Segment id (u32 LE)           │
//! │  9       │  4     │  Entry count (u32 LE)          │
//! │  13      │  ...   │  Entries                       │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Each entry: seq (u64), tombstone (u8), klen (u32), record_size (u32),
//! offset (u64), then klen key bytes. Entry order is irrelevant.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use marcasite_io::{IoBackend, IoError};
use marcasite_types::{Location, SegmentId};

use crate::codec;

/// Magic bytes identifying a hint file ("HNT1" read little-endian).
const MAGIC: u32 = 0x314E_5448;

/// Current hint file format version.
const VERSION: u8 = 0x01;

/// Header size: magic(4) + version(1) + segment id(4) + count(4).
const HEADER_SIZE: usize = 13;

/// Fixed entry prefix: seq(8) + tombstone(1) + klen(4) + record_size(4) + offset(8).
const ENTRY_FIXED_SIZE: usize = 25;

/// Returns the hint path of segment `id` inside `data_dir`.
pub(crate) fn hint_path(data_dir: &Path, id: SegmentId) -> PathBuf {
    data_dir.join(format!("{id}.hint"))
}

/// One decoded hint entry: a key and the last [`Location`] it had within
/// the hint's segment.
#[derive(Debug)]
pub(crate) struct HintEntry {
    pub key: Bytes,
    pub loc: Location,
}

/// Why a hint file was passed over in favor of a full segment scan.
///
/// Never surfaced to callers; bootstrap logs the reason and rescans.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HintRejection {
    #[error("no hint file")]
    Missing,
    #[error("hint file is older than its segment")]
    Stale,
    #[error("hint file unreadable: {0}")]
    Unreadable(IoError),
    #[error("bad hint magic: found {actual:#010x}")]
    BadMagic { actual: u32 },
    #[error("unsupported hint version {0}")]
    UnsupportedVersion(u8),
    #[error("hint names segment {actual:06}, expected {expected}")]
    WrongSegment { expected: SegmentId, actual: u32 },
    #[error("hint file truncated")]
    Truncated,
    #[error("{0} bytes of trailing garbage after the last entry")]
    TrailingBytes(usize),
}

/// Loads and fully decodes the hint file for segment `id`.
///
/// Rejects the hint unless it exists, decodes cleanly end to end, names the
/// right segment, and is no older than the segment file itself — a hint
/// that predates the segment's last append is missing records and must not
/// be trusted.
pub(crate) fn load(
    io: &dyn IoBackend,
    data_dir: &Path,
    id: SegmentId,
    segment_path: &Path,
) -> Result<Vec<HintEntry>, HintRejection> {
    let path = hint_path(data_dir, id);
    if !path.exists() {
        return Err(HintRejection::Missing);
    }

    let fresh = (|| -> std::io::Result<bool> {
        let hint_mtime = fs::metadata(&path)?.modified()?;
        let segment_mtime = fs::metadata(segment_path)?.modified()?;
        Ok(hint_mtime >= segment_mtime)
    })()
    .unwrap_or(false);
    if !fresh {
        return Err(HintRejection::Stale);
    }

    let data = io.read_all(&path).map_err(HintRejection::Unreadable)?;
    if data.len() < HEADER_SIZE {
        return Err(HintRejection::Truncated);
    }

    let magic = codec::get_u32(&data, 0);
    if magic != MAGIC {
        return Err(HintRejection::BadMagic { actual: magic });
    }
    if data[4] != VERSION {
        return Err(HintRejection::UnsupportedVersion(data[4]));
    }
    let file_id = codec::get_u32(&data, 5);
    if file_id != id.as_u32() {
        return Err(HintRejection::WrongSegment {
            expected: id,
            actual: file_id,
        });
    }
    let count = codec::get_u32(&data, 9) as usize;

    let mut entries = Vec::with_capacity(count);
    let mut pos = HEADER_SIZE;
    for _ in 0..count {
        if data.len() - pos < ENTRY_FIXED_SIZE {
            return Err(HintRejection::Truncated);
        }
        let seq = codec::get_u64(&data, pos);
        let tombstone = data[pos + 8] != 0;
        let klen = codec::get_u32(&data, pos + 9) as usize;
        let record_size = codec::get_u32(&data, pos + 13);
        let offset = codec::get_u64(&data, pos + 17);
        pos += ENTRY_FIXED_SIZE;

        if data.len() - pos < klen {
            return Err(HintRejection::Truncated);
        }
        let key = data.slice(pos..pos + klen);
        pos += klen;

        entries.push(HintEntry {
            key,
            loc: Location {
                segment: id,
                offset,
                record_size,
                seq,
                tombstone,
            },
        });
    }
    if pos != data.len() {
        return Err(HintRejection::TrailingBytes(data.len() - pos));
    }

    Ok(entries)
}

/// Writes (replacing) the hint file for segment `id` from a map of final
/// per-key locations.
pub(crate) fn write(
    io: &dyn IoBackend,
    data_dir: &Path,
    id: SegmentId,
    last_in_segment: &HashMap<Bytes, Location>,
) -> Result<(), IoError> {
    let body: usize = last_in_segment
        .keys()
        .map(|key| ENTRY_FIXED_SIZE + key.len())
        .sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + body);

    codec::put_u32(&mut buf, MAGIC);
    buf.push(VERSION);
    codec::put_u32(&mut buf, id.as_u32());
    codec::put_u32(&mut buf, last_in_segment.len() as u32);

    for (key, loc) in last_in_segment {
        codec::put_u64(&mut buf, loc.seq);
        buf.push(u8::from(loc.tombstone));
        codec::put_u32(&mut buf, key.len() as u32);
        codec::put_u32(&mut buf, loc.record_size);
        codec::put_u64(&mut buf, loc.offset);
        buf.extend_from_slice(key);
    }

    io.write_all(&hint_path(data_dir, id), &buf)
}
