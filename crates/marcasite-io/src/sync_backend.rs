//! Synchronous I/O backend using `std::fs`.
//!
//! The default (and currently only) backend. Positional reads use `pread`
//! on Unix and `seek_read` on Windows; neither moves the append position of
//! a write handle.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use bytes::Bytes;

use crate::IoError;
use crate::backend::{FileHandle, IoBackend, OpenFlags};

/// Synchronous I/O backend over `std::fs::File`.
#[derive(Debug, Default)]
pub struct SyncBackend;

impl SyncBackend {
    /// Creates a new synchronous I/O backend.
    pub fn new() -> Self {
        Self
    }
}

/// One positional read; returns the number of bytes read, 0 at EOF.
fn read_at(file: &fs::File, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        Ok(file.read_at(buf, offset)?)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        Ok(file.seek_read(buf, offset)?)
    }
}

impl IoBackend for SyncBackend {
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<FileHandle, IoError> {
        let mut opts = OpenOptions::new();
        opts.read(flags.read)
            .write(flags.write)
            .create(flags.create)
            .append(flags.append);
        let file = opts.open(path)?;
        Ok(FileHandle::from_file(file))
    }

    fn append(&self, handle: &mut FileHandle, buf: &[u8]) -> Result<u64, IoError> {
        // In append mode the kernel positions the write at EOF; the length
        // before the write is therefore the offset the record lands at.
        // Correct only under the single-writer-per-file discipline.
        let start = handle.file.metadata()?.len();
        handle.file.write_all(buf)?;
        Ok(start)
    }

    fn read_exact_at(
        &self,
        handle: &FileHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), IoError> {
        let mut filled = 0;
        while filled < buf.len() {
            match read_at(&handle.file, offset + filled as u64, &mut buf[filled..])? {
                0 => {
                    return Err(IoError::ShortRead {
                        offset,
                        expected: buf.len(),
                        actual: filled,
                    });
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    fn fsync(&self, handle: &FileHandle) -> Result<(), IoError> {
        handle.file.sync_all()?;
        Ok(())
    }

    fn file_size(&self, handle: &FileHandle) -> Result<u64, IoError> {
        Ok(handle.file.metadata()?.len())
    }

    fn read_all(&self, path: &Path) -> Result<Bytes, IoError> {
        Ok(Bytes::from(fs::read(path)?))
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        let mut file = fs::File::create(path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_reports_start_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.log");
        let backend = SyncBackend::new();

        let mut handle = backend.open(&path, OpenFlags::append_create()).unwrap();
        assert_eq!(backend.append(&mut handle, b"hello").unwrap(), 0);
        assert_eq!(backend.append(&mut handle, b" world").unwrap(), 5);
        assert_eq!(backend.file_size(&handle).unwrap(), 11);
    }

    #[test]
    fn append_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.log");
        let backend = SyncBackend::new();

        let mut handle = backend.open(&path, OpenFlags::append_create()).unwrap();
        backend.append(&mut handle, b"first").unwrap();
        drop(handle);

        let mut handle = backend.open(&path, OpenFlags::append_create()).unwrap();
        assert_eq!(backend.append(&mut handle, b"|second").unwrap(), 5);
        assert_eq!(&backend.read_all(&path).unwrap()[..], b"first|second");
    }

    #[test]
    fn read_exact_at_reads_middle_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let backend = SyncBackend::new();
        backend.write_all(&path, b"0123456789").unwrap();

        let handle = backend.open(&path, OpenFlags::read_only()).unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact_at(&handle, 3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn read_exact_at_fails_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let backend = SyncBackend::new();
        backend.write_all(&path, b"short").unwrap();

        let handle = backend.open(&path, OpenFlags::read_only()).unwrap();
        let mut buf = [0u8; 16];
        let err = backend.read_exact_at(&handle, 0, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            IoError::ShortRead {
                expected: 16,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn readers_do_not_disturb_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.log");
        let backend = SyncBackend::new();

        let mut writer = backend.open(&path, OpenFlags::append_create()).unwrap();
        backend.append(&mut writer, b"aaaa").unwrap();

        let reader = backend.open(&path, OpenFlags::read_only()).unwrap();
        let mut buf = [0u8; 2];
        backend.read_exact_at(&reader, 0, &mut buf).unwrap();

        // The next append still lands at EOF, not at the reader's position.
        assert_eq!(backend.append(&mut writer, b"bbbb").unwrap(), 4);
        assert_eq!(&backend.read_all(&path).unwrap()[..], b"aaaabbbb");
    }

    #[test]
    fn fsync_succeeds_after_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.log");
        let backend = SyncBackend::new();

        let mut handle = backend.open(&path, OpenFlags::append_create()).unwrap();
        backend.append(&mut handle, b"durable").unwrap();
        backend.fsync(&handle).unwrap();
    }
}
