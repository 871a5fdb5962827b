//! I/O error types.

/// Errors from the I/O backend.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Underlying OS I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A positional read hit end-of-file before filling the buffer.
    #[error("short read at offset {offset}: wanted {expected} bytes, file had {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },
}
