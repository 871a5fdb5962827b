//! The store: bootstrap, in-memory index, write/read protocols, compaction.
//!
//! # File Layout
//!
//! ```text
//! {data_dir}/
//! ├── 000001.log   <- sealed segment (immutable once rolled)
//! ├── 000001.hint  <- bootstrap accelerator for segment 1
//! ├── 000002.log   <- active segment (append-only)
//! └── ...
//! ```
//!
//! # Write and Read Paths
//!
//! Writes append a record to the active segment and replace the key's index
//! entry under the exclusive lock; the index mutation is the linearization
//! point. Reads look the key up under the shared lock and do one positional
//! read against a cached read-only segment handle.
//!
//! # Invariants
//!
//! - Sequence numbers are strictly increasing across all records the store
//!   ever writes, restarts included
//! - Every index entry points at a decodable record with matching seq and
//!   opcode in an existing segment file
//! - The active segment is always the one with the largest id
//! - The active segment exceeds `segment_max_bytes` by at most one record:
//!   rolling happens lazily before the write that found it over-sized

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use marcasite_io::{IoBackend, SyncBackend};
use marcasite_types::{Location, Opcode, SegmentId, StoreConfig};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::hint::{self, HintRejection};
use crate::segment::{self, LogSegment};

/// What a compaction pass accomplished.
#[derive(Debug, Clone)]
pub struct CompactionStats {
    /// Number of segments before compaction.
    pub segments_before: usize,
    /// Number of segments after compaction (always 1).
    pub segments_after: usize,
    /// Bytes of segment data released back to the filesystem.
    pub bytes_reclaimed: u64,
    /// Tombstoned index entries dropped.
    pub tombstones_dropped: u64,
}

/// A persistent, crash-resilient key-value store over an append-only log.
///
/// Keys and values are arbitrary byte strings. All writes go to the tail of
/// the active log segment; an in-memory index maps each key to its newest
/// on-disk record, so point reads cost one positional read.
///
/// `Store` is safe to share across threads. It is **not** safe to open the
/// same data directory from two processes (or two `Store` values) at once:
/// the engine relies on being the sole writer per directory, and nothing at
/// the OS level enforces that.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    io: Arc<dyn IoBackend>,

    /// Guards the index, segment id list, active segment, and sequence
    /// counter. Writers and compaction take it exclusively; reads share it.
    inner: RwLock<Inner>,

    /// Read-only segment handles shared among concurrent gets. Guarded by
    /// its own mutex, held only for lookup/insert, and emptied wholesale by
    /// compaction once the files it points at are gone.
    ro_cache: Mutex<HashMap<SegmentId, Arc<LogSegment>>>,
}

#[derive(Debug)]
struct Inner {
    /// For each key, the [`Location`] of the most recent record written for
    /// it. Tombstoned entries stay here to suppress stale reads until
    /// compaction removes them.
    index: HashMap<Bytes, Location>,
    /// All segment ids on disk, ascending; the last one is active.
    segment_ids: Vec<SegmentId>,
    active: LogSegment,
    /// Last allocated sequence number.
    seq: u64,
}

impl Store {
    /// Opens (creating if missing) the store in `config.data_dir`.
    ///
    /// Bootstraps the in-memory index from hint files where they are valid
    /// and full segment scans where they are not. Completes before any
    /// operation is serviced.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_backend(config, Arc::new(SyncBackend::new()))
    }

    /// Opens the store over a caller-supplied I/O backend.
    pub fn open_with_backend(
        config: StoreConfig,
        io: Arc<dyn IoBackend>,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;
        let inner = bootstrap(&config, &io)?;
        Ok(Self {
            config,
            io,
            inner: RwLock::new(inner),
            ro_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.write_inner()?;
        self.roll_segment_if_needed(&mut inner)?;

        inner.seq += 1;
        let seq = inner.seq;
        let loc = inner
            .active
            .append(Opcode::Set, seq, key, value, self.config.fsync_each_write)?;
        inner.index.insert(Bytes::copy_from_slice(key), loc);
        Ok(())
    }

    /// Tombstones `key`. Returns `true` iff a live key was deleted;
    /// deleting a missing or already-deleted key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<bool, StoreError> {
        let mut inner = self.write_inner()?;
        match inner.index.get(key) {
            None => return Ok(false),
            Some(loc) if loc.tombstone => return Ok(false),
            Some(_) => {}
        }
        self.roll_segment_if_needed(&mut inner)?;

        inner.seq += 1;
        let seq = inner.seq;
        let loc = inner
            .active
            .append(Opcode::Del, seq, key, b"", self.config.fsync_each_write)?;
        inner.index.insert(Bytes::copy_from_slice(key), loc);
        Ok(true)
    }

    /// Returns the current value of `key`, or `None` if it was never
    /// written or has been deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let inner = self.read_inner()?;
        let loc = match inner.index.get(key) {
            None => return Ok(None),
            Some(loc) if loc.tombstone => return Ok(None),
            Some(loc) => *loc,
        };

        // The shared lock stays held across the read: compaction needs the
        // exclusive lock, so the segment file cannot vanish mid-read.
        let seg = self.ro_segment(loc.segment)?;
        Ok(Some(seg.read_value(&loc)?))
    }

    /// Rewrites every live key into a single fresh segment and deletes all
    /// older segments, reclaiming the space held by overwritten records and
    /// tombstones.
    ///
    /// Runs under the exclusive lock: concurrent writers and readers block
    /// for the duration. Rewritten records get fresh sequence numbers, so a
    /// crash mid-compaction leaves a directory whose bootstrap converges on
    /// the rewritten copies; the leftover old segments only waste space
    /// until the next compaction.
    pub fn compact(&self) -> Result<CompactionStats, StoreError> {
        let mut guard = self.write_inner()?;
        let inner = &mut *guard;
        let segments_before = inner.segment_ids.len();

        let new_id = inner.active.id().next();
        let mut out = LogSegment::open_active(
            new_id,
            segment::segment_path(&self.config.data_dir, new_id),
            Arc::clone(&self.io),
        )?;

        let live: Vec<(Bytes, Location)> = inner
            .index
            .iter()
            .filter(|(_, loc)| !loc.tombstone)
            .map(|(key, loc)| (key.clone(), *loc))
            .collect();

        let mut last_in_new: HashMap<Bytes, Location> = HashMap::with_capacity(live.len());
        for (key, loc) in live {
            let src = LogSegment::open_readonly(
                loc.segment,
                segment::segment_path(&self.config.data_dir, loc.segment),
                Arc::clone(&self.io),
            )?;
            let value = src.read_value(&loc)?;

            inner.seq += 1;
            let new_loc = out.append(
                Opcode::Set,
                inner.seq,
                &key,
                &value,
                self.config.fsync_each_write,
            )?;
            inner.index.insert(key.clone(), new_loc);
            last_in_new.insert(key, new_loc);
        }

        // Tombstones are not copied forward; dropping their index entries
        // here leaves the index all-live.
        let tombstones_dropped = (inner.index.len() - last_in_new.len()) as u64;
        inner.index.retain(|_, loc| !loc.tombstone);

        let old_ids = std::mem::replace(&mut inner.segment_ids, vec![new_id]);
        inner.active = out;

        // Removal is best-effort: the new segment already holds everything
        // live, so a file that refuses to die costs space, not data.
        let mut bytes_removed: u64 = 0;
        for id in old_ids {
            let log_path = segment::segment_path(&self.config.data_dir, id);
            if let Ok(meta) = fs::metadata(&log_path) {
                bytes_removed += meta.len();
            }
            if let Err(error) = fs::remove_file(&log_path) {
                warn!(segment = %id, %error, "failed to remove compacted segment");
            }
            let hint_path = hint::hint_path(&self.config.data_dir, id);
            if let Err(error) = fs::remove_file(&hint_path) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(segment = %id, %error, "failed to remove hint file");
                }
            }
        }

        if let Err(error) = hint::write(self.io.as_ref(), &self.config.data_dir, new_id, &last_in_new)
        {
            warn!(segment = %new_id, %error, "failed to write hint file after compaction");
        }

        // Every cached handle points at a deleted file now.
        self.lock_cache()?.clear();

        let stats = CompactionStats {
            segments_before,
            segments_after: 1,
            bytes_reclaimed: bytes_removed.saturating_sub(inner.active.size_bytes()?),
            tombstones_dropped,
        };
        info!(
            segments_before,
            live_keys = last_in_new.len(),
            tombstones_dropped,
            bytes_reclaimed = stats.bytes_reclaimed,
            "compacted log"
        );
        Ok(stats)
    }

    /// Flushes the active segment to stable storage.
    ///
    /// Advisory: with `fsync_each_write` enabled every append is already
    /// durable and this adds nothing. It issues the fsync unconditionally
    /// so that callers running with `fsync_each_write` off have an explicit
    /// durability point.
    pub fn flush(&self) -> Result<(), StoreError> {
        let inner = self.read_inner()?;
        inner.active.sync()
    }

    /// Number of live (non-deleted) keys.
    pub fn len(&self) -> Result<usize, StoreError> {
        let inner = self.read_inner()?;
        Ok(inner.index.values().filter(|loc| !loc.tombstone).count())
    }

    /// Returns `true` if the store holds no live keys.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Rolls to a fresh segment if the active one has reached the size
    /// bound. Called before a write; rolling never rewrites existing data.
    fn roll_segment_if_needed(&self, inner: &mut Inner) -> Result<(), StoreError> {
        if inner.active.size_bytes()? < self.config.segment_max_bytes {
            return Ok(());
        }
        let next = inner.active.id().next();
        let new_active = LogSegment::open_active(
            next,
            segment::segment_path(&self.config.data_dir, next),
            Arc::clone(&self.io),
        )?;
        info!(sealed = %inner.active.id(), active = %next, "rolled to a new segment");
        inner.segment_ids.push(next);
        inner.active = new_active;
        Ok(())
    }

    /// Returns the shared read-only handle for segment `id`, opening and
    /// caching it on first use.
    fn ro_segment(&self, id: SegmentId) -> Result<Arc<LogSegment>, StoreError> {
        let mut cache = self.lock_cache()?;
        if let Some(seg) = cache.get(&id) {
            return Ok(Arc::clone(seg));
        }
        let seg = Arc::new(LogSegment::open_readonly(
            id,
            segment::segment_path(&self.config.data_dir, id),
            Arc::clone(&self.io),
        )?);
        cache.insert(id, Arc::clone(&seg));
        Ok(seg)
    }

    fn read_inner(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SegmentId, Arc<LogSegment>>>, StoreError> {
        self.ro_cache.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Single-threaded bootstrap: enumerate segments, replay hints or scan
/// logs, and open the active segment.
fn bootstrap(config: &StoreConfig, io: &Arc<dyn IoBackend>) -> Result<Inner, StoreError> {
    let mut segment_ids = list_segment_ids(&config.data_dir)?;
    let mut index: HashMap<Bytes, Location> = HashMap::new();
    let mut max_seq = 0u64;

    for &id in &segment_ids {
        let seg_path = segment::segment_path(&config.data_dir, id);
        match hint::load(io.as_ref(), &config.data_dir, id, &seg_path) {
            Ok(entries) => {
                debug!(segment = %id, entries = entries.len(), "replayed hint file");
                for entry in entries {
                    max_seq = max_seq.max(entry.loc.seq);
                    merge_newer(&mut index, entry.key, entry.loc);
                }
            }
            Err(rejection) => {
                match rejection {
                    HintRejection::Missing => debug!(segment = %id, "no hint file, scanning"),
                    reason => warn!(segment = %id, %reason, "ignoring hint file, scanning"),
                }

                let seg = LogSegment::open_readonly(id, seg_path, Arc::clone(io))?;
                let mut last_in_seg: HashMap<Bytes, Location> = HashMap::new();
                seg.scan(|key, loc, _value| merge_newer(&mut last_in_seg, key, loc))?;

                for (key, loc) in &last_in_seg {
                    max_seq = max_seq.max(loc.seq);
                    merge_newer(&mut index, key.clone(), *loc);
                }
                if let Err(error) = hint::write(io.as_ref(), &config.data_dir, id, &last_in_seg) {
                    warn!(segment = %id, %error, "failed to write hint file");
                }
            }
        }
    }

    let active_id = segment_ids.last().copied().unwrap_or(SegmentId::FIRST);
    if segment_ids.is_empty() {
        segment_ids.push(active_id);
    }
    let active = LogSegment::open_active(
        active_id,
        segment::segment_path(&config.data_dir, active_id),
        Arc::clone(io),
    )?;

    info!(
        segments = segment_ids.len(),
        keys = index.len(),
        seq = max_seq,
        "bootstrap complete"
    );
    Ok(Inner {
        index,
        segment_ids,
        active,
        seq: max_seq,
    })
}

/// Inserts `loc` for `key` unless the map already holds a newer record.
fn merge_newer(map: &mut HashMap<Bytes, Location>, key: Bytes, loc: Location) {
    match map.entry(key) {
        Entry::Occupied(mut occupied) => {
            if occupied.get().seq < loc.seq {
                occupied.insert(loc);
            }
        }
        Entry::Vacant(vacant) => {
            vacant.insert(loc);
        }
    }
}

/// Enumerates `NNNNNN.log` files in the data directory, ascending by id.
/// Anything else in the directory is ignored.
fn list_segment_ids(data_dir: &Path) -> Result<Vec<SegmentId>, StoreError> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_filename) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Parses a segment filename: exactly six decimal digits plus `.log`.
fn parse_segment_filename(name: &str) -> Option<SegmentId> {
    let digits = name.strip_suffix(".log")?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().map(SegmentId::new)
}
