use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use quarry_core::{DocRef, SearchType};

use crate::error::{IdsError, Result};

pub const HEADER_SCHEMA_VERSION: u32 = 1;

/// Id source for one search type: freed ids drain before the monotonic
/// counter advances, so ids are not monotonically increasing across the
/// store's lifetime once deletions have occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u32,
    free: VecDeque<u32>,
}

impl IdAllocator {
    fn new() -> IdAllocator {
        // Id 0 is "no id" and is never minted.
        IdAllocator {
            next: 1,
            free: VecDeque::new(),
        }
    }

    pub fn acquire(&mut self) -> DocRef {
        if let Some(id) = self.free.pop_front() {
            return DocRef::new(id).expect("free list never holds id 0");
        }
        let id = self.next;
        self.next = self.next.checked_add(1).expect("stable id space exhausted");
        DocRef::new(id).expect("counter starts at 1")
    }

    pub fn release(&mut self, doc_ref: DocRef) {
        self.free.push_back(doc_ref.get());
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// The id the counter would mint next, ignoring the free list.
    pub fn next_fresh(&self) -> u32 {
        self.next
    }
}

impl Default for IdAllocator {
    fn default() -> IdAllocator {
        IdAllocator::new()
    }
}

/// Per-search-type id counters and free lists.
///
/// Allocator entries are created lazily on first use. A header that will be
/// persisted should call [`StableIdHeader::ensure_all_types`] first so every
/// type present in the run has an entry in the saved form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableIdHeader {
    schema_version: u32,
    counters: BTreeMap<SearchType, IdAllocator>,
}

impl StableIdHeader {
    pub fn new() -> StableIdHeader {
        StableIdHeader {
            schema_version: HEADER_SCHEMA_VERSION,
            counters: BTreeMap::new(),
        }
    }

    pub fn allocator_mut(&mut self, search_type: SearchType) -> &mut IdAllocator {
        self.counters.entry(search_type).or_default()
    }

    pub fn allocator(&self, search_type: SearchType) -> Option<&IdAllocator> {
        self.counters.get(&search_type)
    }

    /// Materializes an allocator for every search type.
    pub fn ensure_all_types(&mut self) {
        for search_type in SearchType::ALL {
            self.allocator_mut(search_type);
        }
    }
}

impl Default for StableIdHeader {
    fn default() -> StableIdHeader {
        StableIdHeader::new()
    }
}

/// Loads a header side file. `Ok(None)` when the file does not exist.
pub fn load_header(path: &Path) -> Result<Option<StableIdHeader>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let header: StableIdHeader = serde_json::from_slice(&bytes)?;
    if header.schema_version != HEADER_SCHEMA_VERSION {
        return Err(IdsError::IncompatibleHeaderVersion {
            expected: HEADER_SCHEMA_VERSION,
            found: header.schema_version,
        });
    }
    Ok(Some(header))
}

/// Saves a header side file atomically (tmp file + rename).
pub fn save_header(path: &Path, header: &StableIdHeader) -> Result<()> {
    let json = serde_json::to_vec_pretty(header)?;

    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(&format!(".tmp.{}", std::process::id()));
    let tmp = std::path::PathBuf::from(tmp);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
