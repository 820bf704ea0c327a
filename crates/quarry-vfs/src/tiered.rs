use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::fs::{rename_overwrite, FileSystem, ReadableFile, WritableFile};

/// Which layer a path currently resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Overlay,
    Backing,
}

/// A file system composed of an immutable backing snapshot and a mutable
/// overlay directory.
///
/// All writes land in the overlay; the backing layer is only ever read.
/// Deletions of backing-layer files are recorded as tombstones so the path
/// appears absent without the snapshot being touched. The tombstone set is
/// exported through [`TieredFs::deletions`] so the owning store can tell
/// which backing-relative paths must be dropped from a previously published
/// snapshot when computing the next delta.
///
/// Resolution rule: overlay presence always wins; a tombstoned path is
/// absent regardless of what the backing layer holds; otherwise the backing
/// layer answers. Recreating a tombstoned path via [`FileSystem::create`]
/// makes it visible again (overlay precedence) while the prior deletion
/// stays listed in [`TieredFs::deletions`].
pub struct TieredFs {
    backing: PathBuf,
    overlay: PathBuf,
    deletions: Mutex<BTreeSet<PathBuf>>,
}

impl TieredFs {
    pub fn new(backing: impl Into<PathBuf>, overlay: impl Into<PathBuf>) -> TieredFs {
        TieredFs {
            backing: backing.into(),
            overlay: overlay.into(),
            deletions: Mutex::new(BTreeSet::new()),
        }
    }

    /// The current tombstone set, sorted.
    pub fn deletions(&self) -> Vec<PathBuf> {
        let deletions = self.deletions.lock().expect("tombstone mutex poisoned");
        deletions.iter().cloned().collect()
    }

    fn overlay_path(&self, path: &Path) -> PathBuf {
        self.overlay.join(path)
    }

    fn backing_path(&self, path: &Path) -> PathBuf {
        self.backing.join(path)
    }

    fn is_tombstoned(&self, path: &Path) -> bool {
        let deletions = self.deletions.lock().expect("tombstone mutex poisoned");
        deletions.contains(path)
    }

    fn tombstone(&self, path: &Path) {
        let mut deletions = self.deletions.lock().expect("tombstone mutex poisoned");
        deletions.insert(path.to_path_buf());
    }

    fn resolve_file(&self, path: &Path) -> Option<Layer> {
        if self.overlay_path(path).is_file() {
            return Some(Layer::Overlay);
        }
        if self.is_tombstoned(path) {
            return None;
        }
        if self.backing_path(path).is_file() {
            return Some(Layer::Backing);
        }
        None
    }

    fn layer_root(&self, layer: Layer) -> &Path {
        match layer {
            Layer::Overlay => &self.overlay,
            Layer::Backing => &self.backing,
        }
    }
}

impl FileSystem for TieredFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.overlay_path(path))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadableFile>> {
        match self.resolve_file(path) {
            Some(layer) => Ok(Box::new(fs::File::open(self.layer_root(layer).join(path))?)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no layer holds {}", path.display()),
            )),
        }
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let full = self.overlay_path(path);
        ensure_parent_dir(&full)?;
        Ok(Box::new(fs::File::create(full)?))
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        // Appending to a file that lives only in the backing layer would
        // mutate the snapshot through the side door. That is a caller
        // contract violation, not an I/O condition.
        assert!(
            !matches!(self.resolve_file(path), Some(Layer::Backing)),
            "cannot open backing-layer file {} in a non-fresh-create write mode",
            path.display()
        );

        let full = self.overlay_path(path);
        ensure_parent_dir(&full)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(full)?;
        Ok(Box::new(file))
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        let Some(layer) = self.resolve_file(path) else {
            return Ok(());
        };

        tracing::debug!(
            target: "quarry.vfs",
            path = %path.display(),
            layer = ?layer,
            "tombstoning file"
        );
        self.tombstone(path);
        if layer == Layer::Overlay {
            fs::remove_file(self.overlay_path(path))?;
        }
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.resolve_file(path).is_some()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        if self.overlay_path(path).is_dir() {
            return true;
        }
        if self.is_tombstoned(path) {
            return false;
        }
        self.backing_path(path).is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = BTreeSet::new();
        for root in [&self.overlay, &self.backing] {
            let full = root.join(path);
            if !full.is_dir() {
                continue;
            }
            for entry in fs::read_dir(full)? {
                let entry = entry?;
                entries.insert(path.join(entry.file_name()));
            }
        }
        Ok(entries
            .into_iter()
            .filter(|entry| {
                // A tombstoned entry stays listed only while an overlay copy
                // shadows the tombstone.
                self.overlay_path(entry).exists() || !self.is_tombstoned(entry)
            })
            .collect())
    }

    fn replace(
        &self,
        source: &Path,
        destination: &Path,
        backup: Option<&Path>,
    ) -> io::Result<()> {
        // Resolve before tombstoning: the tombstone would hide a
        // backing-layer source.
        let Some(layer) = self.resolve_file(source) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("replace source not found: {}", source.display()),
            ));
        };

        self.tombstone(source);
        self.tombstone(destination);
        if let Some(backup) = backup {
            self.tombstone(backup);
        }

        tracing::debug!(
            target: "quarry.vfs",
            source = %source.display(),
            destination = %destination.display(),
            layer = ?layer,
            "replacing file"
        );

        // Both paths are remapped into the namespace the source lives in.
        // When the source resolves to the backing layer the move happens in
        // the backing namespace; callers stage through the overlay first
        // when the snapshot must stay untouched.
        let root = self.layer_root(layer);
        let dest = root.join(destination);
        ensure_parent_dir(&dest)?;
        rename_overwrite(&root.join(source), &dest)
    }

    fn pending_deletions(&self) -> Vec<PathBuf> {
        self.deletions()
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
