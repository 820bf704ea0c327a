use serde::{Deserialize, Serialize};

use crate::SearchType;

/// Width of a [`ShortHash`] in bytes.
pub const SHORT_HASH_LEN: usize = 16;

/// Fixed-width content hash identifying an entity within a search-type
/// namespace.
///
/// The hash is the first 16 bytes of the blake3 digest of the entity's
/// content. 16 bytes is far beyond collision range for the entity counts a
/// single index holds, while keeping store keys compact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShortHash([u8; SHORT_HASH_LEN]);

impl ShortHash {
    pub fn of(content: &[u8]) -> ShortHash {
        let digest = blake3::hash(content);
        let mut bytes = [0u8; SHORT_HASH_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..SHORT_HASH_LEN]);
        ShortHash(bytes)
    }

    pub fn from_bytes(bytes: [u8; SHORT_HASH_LEN]) -> ShortHash {
        ShortHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHORT_HASH_LEN] {
        &self.0
    }

    /// Splits the hash into its high and low 64-bit halves (big-endian byte
    /// order, so the high half covers bytes 0..8).
    pub fn halves(&self) -> (u64, u64) {
        let high = u64::from_be_bytes(self.0[..8].try_into().expect("hash half"));
        let low = u64::from_be_bytes(self.0[8..].try_into().expect("hash half"));
        (high, low)
    }

    /// Scopes the hash to a search type's partition of the keyspace.
    ///
    /// The first byte of the hash is overwritten with the type's numeric id,
    /// so a single byte-ordered store groups all entities of one type into a
    /// contiguous key range.
    pub fn partitioned(&self, search_type: SearchType) -> PartitionedHash {
        let mut bytes = self.0;
        bytes[0] = search_type.as_u8();
        PartitionedHash(bytes)
    }
}

impl std::fmt::Debug for ShortHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShortHash(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A [`ShortHash`] whose first byte has been replaced by a [`SearchType`]
/// id, ready for use as a store key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionedHash([u8; SHORT_HASH_LEN]);

impl PartitionedHash {
    pub fn as_bytes(&self) -> &[u8; SHORT_HASH_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; SHORT_HASH_LEN]) -> PartitionedHash {
        PartitionedHash(bytes)
    }

    pub fn search_type(&self) -> Option<SearchType> {
        SearchType::from_u8(self.0[0])
    }
}

impl std::fmt::Debug for PartitionedHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartitionedHash(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
