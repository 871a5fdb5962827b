//! # marcasite-io: File I/O abstraction for Marcasite
//!
//! This crate provides a trait-based abstraction over the handful of file
//! operations the log engine needs: create-or-append opens, positional
//! reads, appends that report where they landed, and durable flushes.
//!
//! The storage layer programs against [`IoBackend`] so that tests can
//! substitute a mock and so that an io_uring backend can slot in later
//! without touching the engine.
//!
//! # Contract
//!
//! - [`IoBackend::append`] writes **all** of the supplied bytes or fails;
//!   partial writes are surfaced as errors, never as short counts. The
//!   returned offset is where the write began.
//! - [`IoBackend::read_exact_at`] fills the whole buffer or fails with
//!   [`IoError::ShortRead`]; it never returns partially filled buffers.
//! - Files opened with [`OpenFlags::append_create`] write at EOF regardless
//!   of any reader's position. Files opened with [`OpenFlags::read_only`]
//!   may be read concurrently from many threads.
//! - Exclusive write access is not enforced at the OS level; callers own
//!   the single-writer-per-directory discipline.

mod backend;
mod error;
mod sync_backend;

pub use backend::{FileHandle, IoBackend, OpenFlags};
pub use error::IoError;
pub use sync_backend::SyncBackend;
