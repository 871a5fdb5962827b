//! # Marcasite
//!
//! An embedded, crash-resilient key-value store on an append-only log —
//! the Bitcask shape: every write is an append to the tail of the active
//! log segment, an in-memory index maps each key to its newest on-disk
//! record, and a point read costs one positional read.
//!
//! - **Durability**: records carry CRC-32 checksums and strictly
//!   increasing sequence numbers; with `fsync_each_write` (the default)
//!   every acknowledged write is on stable storage
//! - **Crash recovery**: bootstrap replays per-segment hint files where
//!   valid and scans the log where not; a torn trailing record truncates
//!   the segment logically and costs nothing else
//! - **Space reclamation**: online compaction rewrites live keys into a
//!   fresh segment and deletes the rest
//!
//! # Quick Start
//!
//! ```
//! use marcasite::{Store, StoreConfig};
//!
//! # fn main() -> Result<(), marcasite::StoreError> {
//! let dir = tempfile::tempdir().unwrap();
//! let store = Store::open(StoreConfig::new(dir.path()))?;
//!
//! store.put(b"castle", b"keep")?;
//! assert_eq!(store.get(b"castle")?.as_deref(), Some(&b"keep"[..]));
//!
//! assert!(store.delete(b"castle")?);
//! assert_eq!(store.get(b"castle")?, None);
//! # Ok(())
//! # }
//! ```
//!
//! # Single Writer
//!
//! One data directory belongs to one [`Store`] in one process. The engine
//! does not take an OS-level lock; opening the same directory twice
//! corrupts the segment tail ordering.

mod codec;
mod error;
mod hint;
mod record;
mod segment;
mod store;

pub use error::StoreError;
pub use store::{CompactionStats, Store};

// Value types callers need alongside the store.
pub use marcasite_types::{
    DEFAULT_SEGMENT_MAX_BYTES, Location, Opcode, SegmentId, StoreConfig,
};
