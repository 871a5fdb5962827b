//! I/O backend trait.

use std::path::Path;

use bytes::Bytes;

use crate::IoError;

/// Flags for opening files.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create the file if it doesn't exist.
    pub create: bool,
    /// Open in append mode: every write lands at EOF.
    pub append: bool,
}

impl OpenFlags {
    /// Flags for positional reads of an existing file. Concurrent readers
    /// are allowed.
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// Flags for the active segment: create-if-missing, read plus append.
    ///
    /// Plain append semantics — the OS positions every write at EOF, so no
    /// explicit seek is needed or performed.
    pub fn append_create() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            append: true,
        }
    }
}

/// Opaque handle to an open file.
///
/// Backend-specific; for [`SyncBackend`](crate::SyncBackend) it wraps a
/// `std::fs::File`. Closing is dropping.
#[derive(Debug)]
pub struct FileHandle {
    pub(crate) file: std::fs::File,
}

impl FileHandle {
    pub(crate) fn from_file(file: std::fs::File) -> Self {
        Self { file }
    }
}

/// Abstraction over the file operations the log engine needs.
///
/// All methods are synchronous and may block on disk I/O. Implementations
/// must be shareable across threads; read methods take `&FileHandle` so a
/// cached read-only handle can serve concurrent point reads.
pub trait IoBackend: Send + Sync + std::fmt::Debug {
    /// Opens a file with the given flags.
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<FileHandle, IoError>;

    /// Appends all of `buf` to the file, returning the offset at which the
    /// write began. A write that cannot complete in full is an error.
    fn append(&self, handle: &mut FileHandle, buf: &[u8]) -> Result<u64, IoError>;

    /// Reads exactly `buf.len()` bytes at `offset`.
    ///
    /// Fails with [`IoError::ShortRead`] if the file ends first; `buf`
    /// contents are unspecified on error.
    fn read_exact_at(
        &self,
        handle: &FileHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), IoError>;

    /// Forces all previously appended bytes to stable storage.
    fn fsync(&self, handle: &FileHandle) -> Result<(), IoError>;

    /// Returns the current file length in bytes.
    fn file_size(&self, handle: &FileHandle) -> Result<u64, IoError>;

    /// Reads an entire file into memory. Convenience for recovery scans and
    /// hint files.
    fn read_all(&self, path: &Path) -> Result<Bytes, IoError>;

    /// Replaces a file's contents. Convenience for hint files.
    fn write_all(&self, path: &Path, data: &[u8]) -> Result<(), IoError>;
}
