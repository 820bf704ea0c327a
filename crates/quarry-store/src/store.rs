use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use quarry_vfs::FileSystem;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::memtable::Memtable;
use crate::segment::{parse_segment_file_name, segment_file_name, Segment, SegmentWriter};
use crate::wal::{self, Wal, WAL_FILE_NAME};

/// Fixed sub-directory (relative to the file system provider's root) that
/// holds the store's files. Pending-deletion paths reported by
/// [`Store::pending_deletions`] are rooted under this name.
pub const STORE_DIR: &str = "kv";

struct State {
    memtable: Memtable,
    /// Immutable segments, oldest first. Lookups walk them newest first.
    segments: Vec<Segment>,
    next_segment_id: u64,
    wal: Option<Wal>,
    closed: bool,
}

/// Sorted durable key-value store over fixed-size binary records.
///
/// Writers serialize behind the state write lock; readers share the read
/// lock and per-segment handles. All operations are synchronous and may
/// block on disk I/O.
pub struct Store {
    fs: Arc<dyn FileSystem>,
    config: StoreConfig,
    state: RwLock<State>,
}

impl Store {
    /// Opens or creates the store under [`STORE_DIR`].
    ///
    /// Open failures are fatal: callers treat the store as all-or-nothing
    /// per indexing run.
    pub fn open(fs: Arc<dyn FileSystem>, config: StoreConfig) -> Result<Store> {
        let root = Path::new(STORE_DIR);
        fs.create_dir_all(root)?;

        let mut segment_ids = Vec::new();
        for entry in fs.read_dir(root)? {
            let Some(name) = entry.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match parse_segment_file_name(name) {
                Some(id) => segment_ids.push(id),
                None if name != WAL_FILE_NAME => {
                    tracing::trace!(
                        target: "quarry.store",
                        file = name,
                        "ignoring unrecognized file in store directory"
                    );
                }
                None => {}
            }
        }
        segment_ids.sort_unstable();

        let mut segments = Vec::with_capacity(segment_ids.len());
        for id in &segment_ids {
            let path = root.join(segment_file_name(*id));
            segments.push(Segment::open(&fs, path, &config)?);
        }
        let next_segment_id = segment_ids.last().map(|id| id + 1).unwrap_or(1);

        // Replay a leftover log even when logging is now disabled; those
        // records were accepted by a previous run.
        let wal_path = root.join(WAL_FILE_NAME);
        let mut memtable = Memtable::new();
        for (key, value) in wal::replay(&fs, &wal_path, config.key_len, config.value_len)? {
            memtable.insert(key, value);
        }
        let wal = if config.wal {
            Some(Wal::open(&fs, wal_path)?)
        } else {
            if !memtable.is_empty() {
                tracing::debug!(
                    target: "quarry.store",
                    records = memtable.len(),
                    "recovered write-ahead log records; logging is disabled for this run"
                );
            }
            fs.delete_file(&wal_path)?;
            None
        };

        tracing::debug!(
            target: "quarry.store",
            segments = segments.len(),
            replayed = memtable.len(),
            "opened store"
        );

        Ok(Store {
            fs,
            config,
            state: RwLock::new(State {
                memtable,
                segments,
                next_segment_id,
                wal,
                closed: false,
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Inserts or overwrites one record.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        assert_eq!(key.len(), self.config.key_len, "key width mismatch");
        assert_eq!(value.len(), self.config.value_len, "value width mismatch");

        let mut state = self.state.write();
        if let Some(wal) = &mut state.wal {
            wal.append(key, value)?;
        }
        state.memtable.insert(key.into(), value.into());
        if state.memtable.bytes() >= self.config.flush_threshold_bytes {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Point lookup: memtable first, then segments newest first.
    pub fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>> {
        assert_eq!(key.len(), self.config.key_len, "key width mismatch");

        let state = self.state.read();
        if let Some(value) = state.memtable.get(key) {
            return Ok(Some(value.into()));
        }
        for segment in state.segments.iter().rev() {
            if let Some(value) = segment.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Flushes the mutable segment to a new immutable segment file.
    pub fn flush(&self) -> Result<()> {
        self.flush_locked(&mut self.state.write())
    }

    /// Merges all immutable segments into one, deleting the inputs through
    /// the file provider (so staged runs see them as pending deletions).
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)?;
        self.compact_locked(&mut state)
    }

    /// Full sorted-order cursor over every record.
    ///
    /// Intended for diagnostics and export, not hot-path lookups: the
    /// memtable is snapshotted up front and each segment gets its own
    /// sequential file handle.
    pub fn iter(&self) -> Result<StoreIter> {
        let state = self.state.read();
        let mut sources: Vec<RecordSource> = Vec::with_capacity(state.segments.len() + 1);
        sources.push(Box::new(state.memtable.snapshot().into_iter().map(Ok)));
        for segment in state.segments.iter().rev() {
            sources.push(Box::new(segment.iter(&self.fs)?));
        }
        Ok(StoreIter {
            inner: MergeIter::new(sources),
        })
    }

    /// Relative paths the provider holds as logically deleted; empty when
    /// no staging directory is configured.
    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        self.fs.pending_deletions()
    }

    /// Re-reads every immutable segment and checks it against its header's
    /// content hash. Diagnostics only; not part of any hot path.
    pub fn verify(&self) -> Result<()> {
        let state = self.state.read();
        for segment in &state.segments {
            segment.verify(&self.fs)?;
        }
        Ok(())
    }

    /// Flushes, optionally merges (see [`StoreConfig::merge_on_close`]),
    /// and releases the store.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        let mut state = self.state.write();
        if state.closed {
            return Ok(());
        }
        self.flush_locked(&mut state)?;
        if self.config.merge_on_close {
            self.compact_locked(&mut state)?;
        }
        state.closed = true;
        tracing::debug!(
            target: "quarry.store",
            segments = state.segments.len(),
            "closed store"
        );
        Ok(())
    }

    fn flush_locked(&self, state: &mut State) -> Result<()> {
        if state.memtable.is_empty() {
            return Ok(());
        }

        let id = state.next_segment_id;
        let path = self.write_segment(id, state.memtable.iter().map(|(k, v)| Ok((k.into(), v.into()))))?;
        let segment = Segment::open(&self.fs, path, &self.config)?;

        tracing::debug!(
            target: "quarry.store",
            segment = id,
            records = segment.count(),
            bytes = state.memtable.bytes(),
            "flushed mutable segment"
        );

        state.segments.push(segment);
        state.next_segment_id += 1;
        state.memtable.clear();
        if let Some(wal) = &mut state.wal {
            wal.reset(&self.fs)?;
        }
        Ok(())
    }

    fn compact_locked(&self, state: &mut State) -> Result<()> {
        if state.segments.len() < 2 {
            return Ok(());
        }

        let id = state.next_segment_id;
        let mut sources: Vec<RecordSource> = Vec::with_capacity(state.segments.len());
        for segment in state.segments.iter().rev() {
            sources.push(Box::new(segment.iter(&self.fs)?));
        }
        let merged = MergeIter::new(sources);
        let path = self.write_segment(id, merged)?;
        let segment = Segment::open(&self.fs, path, &self.config)?;

        let old: Vec<PathBuf> = state
            .segments
            .iter()
            .map(|segment| segment.path().to_path_buf())
            .collect();
        // Swap in the merged segment before deleting inputs: a failed
        // delete leaves a shadowed-but-consistent store.
        let inputs = state.segments.len();
        state.segments = vec![segment];
        state.next_segment_id += 1;
        for path in old {
            self.fs.delete_file(&path)?;
        }

        tracing::debug!(
            target: "quarry.store",
            segment = id,
            merged_inputs = inputs,
            "merged immutable segments"
        );
        Ok(())
    }

    /// Writes sorted records to `seg_<id>.kvs` via a temp file + atomic
    /// replace.
    fn write_segment(
        &self,
        id: u64,
        records: impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>>,
    ) -> Result<PathBuf> {
        let root = Path::new(STORE_DIR);
        let path = root.join(segment_file_name(id));
        let tmp = root.join(format!("{}.tmp", segment_file_name(id)));

        let mut writer = SegmentWriter::new(self.fs.create(&tmp)?, &self.config)?;
        for record in records {
            let (key, value) = record?;
            writer.add(&key, &value)?;
        }
        writer.finish()?;

        self.fs.replace(&tmp, &path, None)?;
        Ok(path)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(err) = self.close_inner() {
            tracing::warn!(
                target: "quarry.store",
                error = %err,
                "failed to close store cleanly on drop"
            );
        }
    }
}

type RecordSource = Box<dyn Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>>>;

/// K-way merge over sorted sources; earlier sources win duplicate keys.
struct MergeIter {
    sources: Vec<Peekable<RecordSource>>,
}

impl MergeIter {
    fn new(sources: Vec<RecordSource>) -> MergeIter {
        MergeIter {
            sources: sources.into_iter().map(Iterator::peekable).collect(),
        }
    }
}

impl Iterator for MergeIter {
    type Item = Result<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Surface source errors eagerly, then find the smallest key.
        let mut min_key: Option<Box<[u8]>> = None;
        for source in &mut self.sources {
            match source.peek() {
                Some(Err(_)) => {
                    return source.next();
                }
                Some(Ok((key, _))) => {
                    if min_key.as_deref().map(|min| key.as_ref() < min).unwrap_or(true) {
                        min_key = Some(key.clone());
                    }
                }
                None => {}
            }
        }
        let min_key = min_key?;

        // The first source holding the key supplies the record; every other
        // holder is a shadowed duplicate and is skipped.
        let mut result = None;
        for source in &mut self.sources {
            let matches = matches!(
                source.peek(),
                Some(Ok((key, _))) if key.as_ref() == min_key.as_ref()
            );
            if matches {
                let record = source.next();
                if result.is_none() {
                    result = record;
                }
            }
        }
        result
    }
}

/// Sorted full-store cursor returned by [`Store::iter`].
pub struct StoreIter {
    inner: MergeIter,
}

impl Iterator for StoreIter {
    type Item = Result<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_vfs::{LocalFs, TieredFs};

    fn local_fs(temp: &tempfile::TempDir) -> Arc<dyn FileSystem> {
        Arc::new(LocalFs::new(temp.path()))
    }

    fn config() -> StoreConfig {
        StoreConfig::new(4, 4)
    }

    fn collect(store: &Store) -> Vec<(Vec<u8>, Vec<u8>)> {
        store
            .iter()
            .unwrap()
            .map(|entry| {
                let (key, value) = entry.unwrap();
                (key.to_vec(), value.to_vec())
            })
            .collect()
    }

    #[test]
    fn round_trips_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        {
            let store = Store::open(local_fs(&temp), config()).unwrap();
            store.upsert(b"aaaa", b"1111").unwrap();
            store.upsert(b"bbbb", b"2222").unwrap();
            store.close().unwrap();
        }

        let store = Store::open(local_fs(&temp), config()).unwrap();
        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"1111".as_ref()));
        assert_eq!(store.get(b"bbbb").unwrap().as_deref(), Some(b"2222".as_ref()));
        assert_eq!(store.get(b"cccc").unwrap(), None);
    }

    #[test]
    fn newest_write_wins_across_segments() {
        let temp = tempfile::tempdir().unwrap();
        let store = Store::open(local_fs(&temp), config()).unwrap();

        store.upsert(b"aaaa", b"old-").unwrap();
        store.flush().unwrap();
        store.upsert(b"aaaa", b"new-").unwrap();
        store.flush().unwrap();

        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"new-".as_ref()));
        assert_eq!(collect(&store), vec![(b"aaaa".to_vec(), b"new-".to_vec())]);

        store.compact().unwrap();
        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"new-".as_ref()));
    }

    #[test]
    fn iter_merges_memtable_and_segments_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let store = Store::open(local_fs(&temp), config()).unwrap();

        store.upsert(b"cccc", b"3333").unwrap();
        store.upsert(b"aaaa", b"1111").unwrap();
        store.flush().unwrap();
        store.upsert(b"bbbb", b"2222").unwrap();

        let entries = collect(&store);
        assert_eq!(
            entries,
            vec![
                (b"aaaa".to_vec(), b"1111".to_vec()),
                (b"bbbb".to_vec(), b"2222".to_vec()),
                (b"cccc".to_vec(), b"3333".to_vec()),
            ]
        );
    }

    #[test]
    fn threshold_triggers_flush() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.flush_threshold_bytes = 32;
        let store = Store::open(local_fs(&temp), cfg).unwrap();

        for i in 0u32..8 {
            store.upsert(&i.to_be_bytes(), b"vvvv").unwrap();
        }

        let state = store.state.read();
        assert!(
            !state.segments.is_empty(),
            "expected at least one flushed segment"
        );
        drop(state);
        assert_eq!(store.get(&3u32.to_be_bytes()).unwrap().as_deref(), Some(b"vvvv".as_ref()));
    }

    #[test]
    fn compaction_leaves_a_single_segment() {
        let temp = tempfile::tempdir().unwrap();
        let store = Store::open(local_fs(&temp), config()).unwrap();

        for round in 0u32..3 {
            for i in 0u32..4 {
                store.upsert(&i.to_be_bytes(), &round.to_be_bytes()).unwrap();
            }
            store.flush().unwrap();
        }
        store.compact().unwrap();
        store.verify().unwrap();

        let state = store.state.read();
        assert_eq!(state.segments.len(), 1);
        assert_eq!(state.segments[0].count(), 4);
        drop(state);

        for i in 0u32..4 {
            assert_eq!(
                store.get(&i.to_be_bytes()).unwrap().as_deref(),
                Some(2u32.to_be_bytes().as_ref())
            );
        }
    }

    #[test]
    fn wal_recovers_unflushed_records() {
        let temp = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.wal = true;
        cfg.merge_on_close = true;

        {
            let store = Store::open(local_fs(&temp), cfg).unwrap();
            store.upsert(b"aaaa", b"1111").unwrap();
            // Simulate a hard crash: leak the store so neither close nor
            // Drop flushes the memtable. Only the log survives.
            std::mem::forget(store);
        }

        let store = Store::open(local_fs(&temp), cfg).unwrap();
        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"1111".as_ref()));
    }

    #[test]
    fn pending_deletions_surface_merged_away_segments() {
        let temp = tempfile::tempdir().unwrap();
        let backing = temp.path().join("backing");
        let overlay = temp.path().join("overlay");
        std::fs::create_dir_all(&backing).unwrap();
        std::fs::create_dir_all(&overlay).unwrap();

        // Seed the backing snapshot with a prior run's store.
        {
            let fs: Arc<dyn FileSystem> = Arc::new(LocalFs::new(&backing));
            let store = Store::open(fs, config()).unwrap();
            store.upsert(b"aaaa", b"1111").unwrap();
            store.close().unwrap();
        }

        let fs: Arc<dyn FileSystem> = Arc::new(TieredFs::new(&backing, &overlay));
        let store = Store::open(fs, config()).unwrap();
        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"1111".as_ref()));

        store.upsert(b"bbbb", b"2222").unwrap();
        store.flush().unwrap();
        store.compact().unwrap();

        let deletions = store.pending_deletions();
        assert!(
            deletions.contains(&PathBuf::from("kv/seg_1.kvs")),
            "expected the superseded backing segment in {deletions:?}"
        );
        // The backing snapshot itself is untouched.
        assert!(backing.join("kv/seg_1.kvs").is_file());
        assert_eq!(store.get(b"aaaa").unwrap().as_deref(), Some(b"1111".as_ref()));
        assert_eq!(store.get(b"bbbb").unwrap().as_deref(), Some(b"2222".as_ref()));
    }
}
