//! Optional write-ahead log.
//!
//! Records are raw `key ‖ value` frames (widths are fixed by the store
//! config), appended in upsert order. Replay tolerates a torn tail frame:
//! a crash mid-append loses at most that one record, which is acceptable
//! here because the store's durability contract is "re-run analysis".

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_vfs::{FileSystem, WritableFile};

use crate::error::Result;

pub(crate) const WAL_FILE_NAME: &str = "wal.log";

pub(crate) struct Wal {
    path: PathBuf,
    writer: Box<dyn WritableFile>,
}

impl Wal {
    pub(crate) fn open(fs: &Arc<dyn FileSystem>, path: PathBuf) -> Result<Wal> {
        let writer = fs.open_append(&path)?;
        Ok(Wal { path, writer })
    }

    pub(crate) fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writer.write_all(key)?;
        self.writer.write_all(value)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Discards the log contents after a flush made them redundant.
    pub(crate) fn reset(&mut self, fs: &Arc<dyn FileSystem>) -> Result<()> {
        fs.delete_file(&self.path)?;
        self.writer = fs.open_append(&self.path)?;
        Ok(())
    }
}

/// Replays an existing log, yielding complete frames in append order.
///
/// A trailing partial frame is dropped with a warning rather than failing
/// the open.
pub(crate) fn replay(
    fs: &Arc<dyn FileSystem>,
    path: &Path,
    key_len: usize,
    value_len: usize,
) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
    if !fs.file_exists(path) {
        return Ok(Vec::new());
    }

    let mut reader = BufReader::new(fs.open_read(path)?);
    let mut frames = Vec::new();
    let mut frame = vec![0u8; key_len + value_len];
    loop {
        match read_frame(&mut reader, &mut frame)? {
            FrameRead::Complete => {
                let key = frame[..key_len].to_vec().into_boxed_slice();
                let value = frame[key_len..].to_vec().into_boxed_slice();
                frames.push((key, value));
            }
            FrameRead::End => break,
            FrameRead::Torn(bytes) => {
                tracing::warn!(
                    target: "quarry.store",
                    path = %path.display(),
                    torn_bytes = bytes,
                    replayed = frames.len(),
                    "dropping torn frame at write-ahead log tail"
                );
                break;
            }
        }
    }
    Ok(frames)
}

enum FrameRead {
    Complete,
    End,
    Torn(usize),
}

fn read_frame(reader: &mut impl Read, frame: &mut [u8]) -> Result<FrameRead> {
    let mut filled = 0usize;
    while filled < frame.len() {
        let n = reader.read(&mut frame[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 {
                FrameRead::End
            } else {
                FrameRead::Torn(filled)
            });
        }
        filled += n;
    }
    Ok(FrameRead::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_vfs::LocalFs;

    fn fs() -> (tempfile::TempDir, Arc<dyn FileSystem>) {
        let temp = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFs::new(temp.path()));
        (temp, fs)
    }

    #[test]
    fn replay_returns_appended_frames() {
        let (_temp, fs) = fs();
        let path = PathBuf::from(WAL_FILE_NAME);
        let mut wal = Wal::open(&fs, path.clone()).unwrap();
        wal.append(b"aaaa", b"v1").unwrap();
        wal.append(b"bbbb", b"v2").unwrap();

        let frames = replay(&fs, &path, 4, 2).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0.as_ref(), b"aaaa");
        assert_eq!(frames[1].1.as_ref(), b"v2");
    }

    #[test]
    fn torn_tail_is_dropped() {
        let (temp, fs) = fs();
        let path = PathBuf::from(WAL_FILE_NAME);
        let mut wal = Wal::open(&fs, path.clone()).unwrap();
        wal.append(b"aaaa", b"v1").unwrap();
        drop(wal);

        // Simulate a crash mid-append: a frame missing its value bytes.
        use std::fs::OpenOptions;
        let mut file = OpenOptions::new()
            .append(true)
            .open(temp.path().join(&path))
            .unwrap();
        file.write_all(b"bb").unwrap();
        drop(file);

        let frames = replay(&fs, &path, 4, 2).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.as_ref(), b"aaaa");
    }

    #[test]
    fn reset_empties_the_log() {
        let (_temp, fs) = fs();
        let path = PathBuf::from(WAL_FILE_NAME);
        let mut wal = Wal::open(&fs, path.clone()).unwrap();
        wal.append(b"aaaa", b"v1").unwrap();
        wal.reset(&fs).unwrap();
        assert!(replay(&fs, &path, 4, 2).unwrap().is_empty());

        wal.append(b"cccc", b"v3").unwrap();
        let frames = replay(&fs, &path, 4, 2).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0.as_ref(), b"cccc");
    }
}
