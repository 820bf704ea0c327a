//! Immutable sorted segment files.
//!
//! ## Format (all integers little-endian)
//! ```text
//! magic            8 bytes  "QRYKVSEG"
//! format version   u32
//! key width        u32
//! value width      u32
//! reserved         u32      (zero)
//! record count     u64
//! content hash     u64      truncated blake3 of the record region
//! records          count × (key ‖ value), sorted by key bytes
//! ```
//! Records are fixed-width, so a point lookup is a binary search over the
//! file with one seek + read per probe; no in-memory index is needed.

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use quarry_vfs::{FileSystem, ReadableFile, WritableFile};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

pub(crate) const SEGMENT_MAGIC: [u8; 8] = *b"QRYKVSEG";
pub(crate) const SEGMENT_FORMAT_VERSION: u32 = 1;
pub(crate) const SEGMENT_HEADER_LEN: u64 = 40;

pub(crate) fn segment_file_name(id: u64) -> String {
    format!("seg_{id}.kvs")
}

/// Parses `seg_<id>.kvs`, returning the id.
pub(crate) fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("seg_")?.strip_suffix(".kvs")?.parse().ok()
}

struct SegmentHeader {
    key_len: usize,
    value_len: usize,
    count: u64,
    content_hash: u64,
}

impl SegmentHeader {
    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&SEGMENT_MAGIC)?;
        out.write_u32::<LittleEndian>(SEGMENT_FORMAT_VERSION)?;
        out.write_u32::<LittleEndian>(self.key_len as u32)?;
        out.write_u32::<LittleEndian>(self.value_len as u32)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u64::<LittleEndian>(self.count)?;
        out.write_u64::<LittleEndian>(self.content_hash)?;
        Ok(())
    }

    fn read_from(reader: &mut dyn Read, path: &Path) -> Result<SegmentHeader> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != SEGMENT_MAGIC {
            return Err(corrupt(path, "bad magic"));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SEGMENT_FORMAT_VERSION {
            return Err(corrupt(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let key_len = reader.read_u32::<LittleEndian>()? as usize;
        let value_len = reader.read_u32::<LittleEndian>()? as usize;
        let _reserved = reader.read_u32::<LittleEndian>()?;
        let count = reader.read_u64::<LittleEndian>()?;
        let content_hash = reader.read_u64::<LittleEndian>()?;
        Ok(SegmentHeader {
            key_len,
            value_len,
            count,
            content_hash,
        })
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptSegment {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Streams sorted records into a new segment file.
///
/// The header is written as a placeholder first and overwritten once the
/// record count and content hash are known, so the writer needs `Seek`.
pub(crate) struct SegmentWriter {
    out: Box<dyn WritableFile>,
    key_len: usize,
    value_len: usize,
    count: u64,
    hasher: blake3::Hasher,
    last_key: Option<Vec<u8>>,
}

impl SegmentWriter {
    pub(crate) fn new(mut out: Box<dyn WritableFile>, config: &StoreConfig) -> Result<SegmentWriter> {
        out.write_all(&[0u8; SEGMENT_HEADER_LEN as usize])?;
        Ok(SegmentWriter {
            out,
            key_len: config.key_len,
            value_len: config.value_len,
            count: 0,
            hasher: blake3::Hasher::new(),
            last_key: None,
        })
    }

    /// Appends one record. Keys must arrive in strictly ascending byte
    /// order; the flush and merge paths both guarantee that.
    pub(crate) fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert_eq!(key.len(), self.key_len);
        debug_assert_eq!(value.len(), self.value_len);
        if let Some(last) = &self.last_key {
            debug_assert!(last.as_slice() < key, "segment records out of order");
        }
        self.last_key = Some(key.to_vec());

        self.out.write_all(key)?;
        self.out.write_all(value)?;
        self.hasher.update(key);
        self.hasher.update(value);
        self.count += 1;
        Ok(())
    }

    /// Seals the segment: rewrites the header with the final count and
    /// content hash. Returns the record count.
    pub(crate) fn finish(mut self) -> Result<u64> {
        let header = SegmentHeader {
            key_len: self.key_len,
            value_len: self.value_len,
            count: self.count,
            content_hash: truncated_hash(&self.hasher),
        };
        self.out.seek(SeekFrom::Start(0))?;
        header.write_to(&mut self.out)?;
        self.out.flush()?;
        Ok(self.count)
    }
}

fn truncated_hash(hasher: &blake3::Hasher) -> u64 {
    let digest = hasher.finalize();
    u64::from_le_bytes(digest.as_bytes()[..8].try_into().expect("hash slice"))
}

/// An open immutable segment.
///
/// Point reads share one file handle behind a mutex; the sequential cursor
/// opens its own handle so iteration never contends with lookups.
pub(crate) struct Segment {
    path: PathBuf,
    count: u64,
    record_len: usize,
    key_len: usize,
    content_hash: u64,
    reader: Mutex<Box<dyn ReadableFile>>,
}

impl Segment {
    pub(crate) fn open(
        fs: &Arc<dyn FileSystem>,
        path: PathBuf,
        config: &StoreConfig,
    ) -> Result<Segment> {
        let mut reader = fs.open_read(&path)?;
        let header = SegmentHeader::read_from(&mut reader, &path)?;

        if header.key_len != config.key_len || header.value_len != config.value_len {
            return Err(StoreError::RecordWidthMismatch {
                path,
                expected_key: config.key_len,
                expected_value: config.value_len,
                found_key: header.key_len,
                found_value: header.value_len,
            });
        }

        let record_len = header.key_len + header.value_len;
        let expected_len = SEGMENT_HEADER_LEN + header.count * record_len as u64;
        let actual_len = reader.seek(SeekFrom::End(0))?;
        if actual_len != expected_len {
            return Err(corrupt(
                &path,
                format!("expected {expected_len} bytes, found {actual_len}"),
            ));
        }

        Ok(Segment {
            path,
            count: header.count,
            record_len,
            key_len: header.key_len,
            content_hash: header.content_hash,
            reader: Mutex::new(reader),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Binary search over the on-disk records.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Box<[u8]>>> {
        debug_assert_eq!(key.len(), self.key_len);
        let mut reader = self.reader.lock();
        let mut record = vec![0u8; self.record_len];

        let mut lo = 0u64;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            reader.seek(SeekFrom::Start(
                SEGMENT_HEADER_LEN + mid * self.record_len as u64,
            ))?;
            reader.read_exact(&mut record)?;
            match record[..self.key_len].cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(record[self.key_len..].to_vec().into_boxed_slice()));
                }
            }
        }
        Ok(None)
    }

    /// Sequential cursor over all records, in key order.
    pub(crate) fn iter(&self, fs: &Arc<dyn FileSystem>) -> Result<SegmentIter> {
        let mut reader = fs.open_read(&self.path)?;
        reader.seek(SeekFrom::Start(SEGMENT_HEADER_LEN))?;
        Ok(SegmentIter {
            reader: BufReader::new(reader),
            remaining: self.count,
            key_len: self.key_len,
            record_len: self.record_len,
        })
    }

    /// Re-reads the record region and checks it against the header's
    /// content hash.
    pub(crate) fn verify(&self, fs: &Arc<dyn FileSystem>) -> Result<()> {
        let mut hasher = blake3::Hasher::new();
        for entry in self.iter(fs)? {
            let (key, value) = entry?;
            hasher.update(&key);
            hasher.update(&value);
        }
        let found = truncated_hash(&hasher);
        if found != self.content_hash {
            return Err(corrupt(
                &self.path,
                format!(
                    "content hash mismatch: header {:#018x}, records {found:#018x}",
                    self.content_hash
                ),
            ));
        }
        Ok(())
    }
}

pub(crate) struct SegmentIter {
    reader: BufReader<Box<dyn ReadableFile>>,
    remaining: u64,
    key_len: usize,
    record_len: usize,
}

impl Iterator for SegmentIter {
    type Item = Result<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut record = vec![0u8; self.record_len];
        if let Err(err) = self.reader.read_exact(&mut record) {
            self.remaining = 0;
            return Some(Err(err.into()));
        }
        let value = record.split_off(self.key_len);
        Some(Ok((record.into_boxed_slice(), value.into_boxed_slice())))
    }
}
