//! Log segment: one append-only on-disk log file.
//!
//! A segment is grown by appends while it is active, sealed when the store
//! rolls to a successor, and deleted by compaction. Sealed segments are
//! immutable and may be read concurrently; the one active segment is owned
//! exclusively by the store's writer lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use marcasite_io::{FileHandle, IoBackend, OpenFlags};
use marcasite_types::{Location, Opcode, SegmentId};
use tracing::warn;

use crate::error::StoreError;
use crate::record::{self, HEADER_SIZE, RecordHeader};

/// Formats a segment filename from its id (`000001.log`).
pub(crate) fn segment_filename(id: SegmentId) -> String {
    format!("{id}.log")
}

/// Returns the path of segment `id` inside `data_dir`.
pub(crate) fn segment_path(data_dir: &Path, id: SegmentId) -> PathBuf {
    data_dir.join(segment_filename(id))
}

/// One log segment and its open file handle.
#[derive(Debug)]
pub(crate) struct LogSegment {
    id: SegmentId,
    path: PathBuf,
    io: Arc<dyn IoBackend>,
    handle: FileHandle,
}

impl LogSegment {
    /// Opens (creating if missing) a segment for appending. Used for the
    /// active segment only.
    pub(crate) fn open_active(
        id: SegmentId,
        path: PathBuf,
        io: Arc<dyn IoBackend>,
    ) -> Result<Self, StoreError> {
        let handle = io.open(&path, OpenFlags::append_create())?;
        Ok(Self {
            id,
            path,
            io,
            handle,
        })
    }

    /// Opens an existing segment for positional reads.
    pub(crate) fn open_readonly(
        id: SegmentId,
        path: PathBuf,
        io: Arc<dyn IoBackend>,
    ) -> Result<Self, StoreError> {
        let handle = io.open(&path, OpenFlags::read_only())?;
        Ok(Self {
            id,
            path,
            io,
            handle,
        })
    }

    pub(crate) fn id(&self) -> SegmentId {
        self.id
    }

    /// Current file length in bytes. The roll check reads this before every
    /// write.
    pub(crate) fn size_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.io.file_size(&self.handle)?)
    }

    /// Forces appended bytes to stable storage.
    pub(crate) fn sync(&self) -> Result<(), StoreError> {
        Ok(self.io.fsync(&self.handle)?)
    }

    /// Appends one record, optionally flushing it to stable storage, and
    /// returns where it landed.
    ///
    /// The whole record goes down in a single append call so a crash leaves
    /// at most one torn record at the tail, never an interleaved one.
    pub(crate) fn append(
        &mut self,
        op: Opcode,
        seq: u64,
        key: &[u8],
        value: &[u8],
        durable: bool,
    ) -> Result<Location, StoreError> {
        let buf = record::encode(op, seq, key, value)?;
        let offset = self.io.append(&mut self.handle, &buf)?;
        if durable {
            self.io.fsync(&self.handle)?;
        }
        Ok(Location {
            segment: self.id,
            offset,
            record_size: buf.len() as u32,
            seq,
            tombstone: op.is_tombstone(),
        })
    }

    /// Reads the value of the SET record at `loc`.
    ///
    /// The CRC is not re-verified here: the index only references records
    /// that were validated at write time or by the last recovery scan. The
    /// magic and opcode checks catch an index that points into garbage.
    pub(crate) fn read_value(&self, loc: &Location) -> Result<Bytes, StoreError> {
        let mut header = [0u8; HEADER_SIZE];
        self.io.read_exact_at(&self.handle, loc.offset, &mut header)?;
        let header = RecordHeader::parse(&header);

        if header.magic != record::MAGIC {
            return Err(StoreError::BadRecordMagic {
                segment: self.id,
                offset: loc.offset,
                actual: header.magic,
            });
        }
        if header.opcode != Opcode::Set.as_byte() {
            return Err(StoreError::NotASetRecord {
                segment: self.id,
                offset: loc.offset,
                opcode: header.opcode,
            });
        }

        let mut value = vec![0u8; header.vlen as usize];
        if !value.is_empty() {
            let value_at = loc.offset + HEADER_SIZE as u64 + u64::from(header.klen);
            self.io.read_exact_at(&self.handle, value_at, &mut value)?;
        }
        Ok(Bytes::from(value))
    }

    /// Sequential recovery read over every decodable record.
    ///
    /// `visit` receives the key (owned, cheap to keep), the record's
    /// [`Location`], and the value bytes, which are only valid for the
    /// duration of the call.
    ///
    /// The scan stops cleanly at the first bad frame — wrong magic or
    /// version, unknown opcode, a body that runs past EOF, or a checksum
    /// mismatch. A torn or corrupt tail is not an error: everything before
    /// it remains authoritative, everything from it on is discarded.
    pub(crate) fn scan<F>(&self, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(Bytes, Location, &[u8]),
    {
        let data = self.io.read_all(&self.path)?;
        let len = data.len();
        let mut pos = 0usize;

        while pos + HEADER_SIZE <= len {
            let header = RecordHeader::parse(&data[pos..]);
            if header.magic != record::MAGIC || header.version != record::VERSION {
                break;
            }
            let Some(op) = Opcode::from_byte(header.opcode) else {
                break;
            };
            if pos as u64 + header.record_size() > len as u64 {
                break;
            }
            let record_size = header.record_size() as usize;

            let body = &data[pos + HEADER_SIZE..pos + record_size];
            if record::checksum(&data[pos..pos + HEADER_SIZE], body) != header.crc {
                break;
            }

            let key_end = pos + HEADER_SIZE + header.klen as usize;
            let loc = Location {
                segment: self.id,
                offset: pos as u64,
                record_size: record_size as u32,
                seq: header.seq,
                tombstone: op.is_tombstone(),
            };
            visit(
                data.slice(pos + HEADER_SIZE..key_end),
                loc,
                &data[key_end..pos + record_size],
            );
            pos += record_size;
        }

        if pos < len {
            warn!(
                segment = %self.id,
                offset = pos,
                discarded = len - pos,
                "discarding torn or corrupt segment tail"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use marcasite_io::SyncBackend;

    use super::*;

    fn io() -> Arc<dyn IoBackend> {
        Arc::new(SyncBackend::new())
    }

    fn collect(seg: &LogSegment) -> Vec<(Bytes, Location, Vec<u8>)> {
        let mut out = Vec::new();
        seg.scan(|key, loc, value| out.push((key, loc, value.to_vec())))
            .unwrap();
        out
    }

    #[test]
    fn append_then_read_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();

        let loc = seg.append(Opcode::Set, 1, b"castle", b"keep", false).unwrap();
        assert_eq!(loc.offset, 0);
        assert_eq!(loc.record_size, 28 + 6 + 4);
        assert!(!loc.tombstone);
        assert_eq!(&seg.read_value(&loc).unwrap()[..], b"keep");
    }

    #[test]
    fn read_value_of_empty_value_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();

        let loc = seg.append(Opcode::Set, 1, b"k", b"", false).unwrap();
        assert_eq!(seg.read_value(&loc).unwrap().len(), 0);
    }

    #[test]
    fn read_value_rejects_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();

        let loc = seg.append(Opcode::Del, 2, b"k", b"", false).unwrap();
        assert!(loc.tombstone);
        assert!(matches!(
            seg.read_value(&loc).unwrap_err(),
            StoreError::NotASetRecord { opcode: 2, .. }
        ));
    }

    #[test]
    fn read_value_rejects_misaligned_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();

        seg.append(Opcode::Set, 1, b"key", b"value", false).unwrap();
        let bogus = Location {
            segment: SegmentId::FIRST,
            offset: 2,
            record_size: 36,
            seq: 1,
            tombstone: false,
        };
        assert!(matches!(
            seg.read_value(&bogus).unwrap_err(),
            StoreError::BadRecordMagic { .. }
        ));
    }

    #[test]
    fn scan_yields_records_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();

        seg.append(Opcode::Set, 1, b"a", b"1", false).unwrap();
        seg.append(Opcode::Set, 2, b"b", b"22", false).unwrap();
        seg.append(Opcode::Del, 3, b"a", b"", false).unwrap();

        let records = collect(&seg);
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0].0[..], b"a");
        assert_eq!(records[0].2, b"1");
        assert_eq!(records[1].1.seq, 2);
        assert_eq!(records[1].2, b"22");
        assert!(records[2].1.tombstone);
        assert!(records[2].2.is_empty());
        assert_eq!(records[1].1.offset, records[0].1.offset + u64::from(records[0].1.record_size));
    }

    #[test]
    fn scan_stops_at_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path.clone(), io()).unwrap();

        seg.append(Opcode::Set, 1, b"whole", b"value", false).unwrap();
        let loc = seg.append(Opcode::Set, 2, b"torn", b"victim", false).unwrap();
        drop(seg);

        // Cut into the middle of the second record.
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(loc.offset + 10).unwrap();
        drop(file);

        let seg = LogSegment::open_readonly(SegmentId::FIRST, path, io()).unwrap();
        let records = collect(&seg);
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].0[..], b"whole");
    }

    #[test]
    fn scan_stops_at_corrupt_crc_and_ignores_later_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let mut seg = LogSegment::open_active(SegmentId::FIRST, path.clone(), io()).unwrap();

        seg.append(Opcode::Set, 1, b"good", b"ok", false).unwrap();
        let middle = seg.append(Opcode::Set, 2, b"bad", b"rot", false).unwrap();
        seg.append(Opcode::Set, 3, b"later", b"also-dropped", false).unwrap();
        drop(seg);

        // Flip one value byte in the middle record. Corruption truncates,
        // it never leaves a hole.
        let mut bytes = fs::read(&path).unwrap();
        let flip = (middle.offset + 28 + 3) as usize;
        bytes[flip] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let seg = LogSegment::open_readonly(SegmentId::FIRST, path, io()).unwrap();
        let records = collect(&seg);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.seq, 1);
    }

    #[test]
    fn scan_of_empty_segment_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), SegmentId::FIRST);
        let seg = LogSegment::open_active(SegmentId::FIRST, path, io()).unwrap();
        assert!(collect(&seg).is_empty());
    }

    #[test]
    fn filenames_are_zero_padded() {
        assert_eq!(segment_filename(SegmentId::new(7)), "000007.log");
        assert_eq!(segment_filename(SegmentId::new(123_456)), "123456.log");
    }
}
