use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Readable file handle produced by a [`FileSystem`].
pub trait ReadableFile: io::Read + io::Seek + Send {}
impl<T: io::Read + io::Seek + Send> ReadableFile for T {}

/// Writable file handle produced by a [`FileSystem`].
pub trait WritableFile: io::Write + io::Seek + Send + Sync {}
impl<T: io::Write + io::Seek + Send + Sync> WritableFile for T {}

/// File system abstraction for Quarry's storage engines.
///
/// The trait is intentionally small so it can be implemented for different
/// backends (a plain root directory, an overlay/backing composition, future
/// remote snapshots). All operations take paths relative to the
/// implementation's root and are synchronous blocking I/O.
pub trait FileSystem: Send + Sync {
    /// Creates a directory and any missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Opens an existing file for reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadableFile>>;

    /// Creates (or truncates) a file for writing, creating parent
    /// directories as needed.
    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;

    /// Opens a file for appending, creating it (and parent directories) if
    /// absent.
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;

    /// Deletes a file. Deleting an absent path is not an error.
    fn delete_file(&self, path: &Path) -> io::Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    fn dir_exists(&self, path: &Path) -> bool;

    /// Lists the entries of a directory as relative paths (the directory
    /// path joined with each entry's file name). Missing directories list
    /// as empty.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Atomically moves `source` over `destination`, overwriting it if
    /// present. `backup` is accepted for callers that pass one but no
    /// restoration semantics are attached to it.
    fn replace(&self, source: &Path, destination: &Path, backup: Option<&Path>)
        -> io::Result<()>;

    /// Relative paths this file system treats as logically deleted.
    ///
    /// Only staged (overlay/backing) implementations track these; plain
    /// roots have nothing pending.
    fn pending_deletions(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Root-relative local file system.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> LocalFs {
        LocalFs { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FileSystem for LocalFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadableFile>> {
        Ok(Box::new(fs::File::open(self.resolve(path))?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let full = self.resolve(path);
        ensure_parent_dir(&full)?;
        Ok(Box::new(fs::File::create(full)?))
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let full = self.resolve(path);
        ensure_parent_dir(&full)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(full)?;
        Ok(Box::new(file))
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let full = self.resolve(path);
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(full)? {
            let entry = entry?;
            out.push(path.join(entry.file_name()));
        }
        Ok(out)
    }

    fn replace(
        &self,
        source: &Path,
        destination: &Path,
        _backup: Option<&Path>,
    ) -> io::Result<()> {
        let dest = self.resolve(destination);
        ensure_parent_dir(&dest)?;
        rename_overwrite(&self.resolve(source), &dest)
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Renames `source` over `dest`, overwriting an existing destination.
///
/// On Windows `rename` doesn't overwrite; under concurrent writers multiple
/// `remove + rename` sequences can race, so retry until one wins.
pub(crate) fn rename_overwrite(source: &Path, dest: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;

    loop {
        match fs::rename(source, dest) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists || dest.exists() => {
                let _ = fs::remove_file(dest);

                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }

                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn create_write_read_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(temp.path());

        let path = Path::new("nested/dir/data.bin");
        {
            let mut file = fs.create(path).unwrap();
            file.write_all(b"payload").unwrap();
        }
        assert!(fs.file_exists(path));

        let mut contents = Vec::new();
        fs.open_read(path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"payload");
    }

    #[test]
    fn delete_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(temp.path());

        let path = Path::new("gone.bin");
        fs.create(path).unwrap().write_all(b"x").unwrap();
        fs.delete_file(path).unwrap();
        assert!(!fs.file_exists(path));
        fs.delete_file(path).unwrap();
    }

    #[test]
    fn read_dir_lists_relative_paths() {
        let temp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(temp.path());

        fs.create(Path::new("store/a.bin")).unwrap().write_all(b"a").unwrap();
        fs.create(Path::new("store/b.bin")).unwrap().write_all(b"b").unwrap();

        let mut entries = fs.read_dir(Path::new("store")).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![PathBuf::from("store/a.bin"), PathBuf::from("store/b.bin")]
        );
        assert!(fs.read_dir(Path::new("missing")).unwrap().is_empty());
    }

    #[test]
    fn replace_overwrites_destination() {
        let temp = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(temp.path());

        fs.create(Path::new("new.bin")).unwrap().write_all(b"new").unwrap();
        fs.create(Path::new("old.bin")).unwrap().write_all(b"old").unwrap();

        fs.replace(Path::new("new.bin"), Path::new("old.bin"), None)
            .unwrap();

        let mut contents = Vec::new();
        fs.open_read(Path::new("old.bin"))
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"new");
        assert!(!fs.file_exists(Path::new("new.bin")));
    }
}
