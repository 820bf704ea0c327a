//! Explicit fixed-width binary codecs for store keys and values.
//!
//! The store compares keys byte-wise, so key encodings must be designed so
//! that byte order matches semantic order wherever ordering matters. In
//! practice that means big-endian integer fields, most-significant grouping field
//! first. Value encodings carry no ordering obligation and use
//! little-endian. Nothing here relies on native memory layout; the on-disk
//! format is portable by construction.

use quarry_core::{
    DocRef, EntityMappingKey, PartitionedHash, ENTITY_MAPPING_KEY_LEN, SHORT_HASH_LEN,
};

/// Fixed-width store key.
pub trait FixedKey: Sized {
    /// Encoded width in bytes.
    const ENCODED_LEN: usize;

    /// Writes the encoding into `out` (exactly `ENCODED_LEN` bytes).
    fn encode(&self, out: &mut [u8]);

    /// Decodes an encoding produced by [`FixedKey::encode`]. Returns `None`
    /// for byte patterns no value of the type encodes to.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

/// Fixed-width store value.
pub trait FixedValue: Sized {
    const ENCODED_LEN: usize;

    fn encode(&self, out: &mut [u8]);

    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl FixedKey for PartitionedHash {
    const ENCODED_LEN: usize = SHORT_HASH_LEN;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<PartitionedHash> {
        Some(PartitionedHash::from_bytes(bytes.try_into().ok()?))
    }
}

impl FixedKey for EntityMappingKey {
    const ENCODED_LEN: usize = ENTITY_MAPPING_KEY_LEN;

    fn encode(&self, out: &mut [u8]) {
        let mut buf = [0u8; ENTITY_MAPPING_KEY_LEN];
        EntityMappingKey::encode(self, &mut buf);
        out.copy_from_slice(&buf);
    }

    fn decode(bytes: &[u8]) -> Option<EntityMappingKey> {
        let buf: [u8; ENTITY_MAPPING_KEY_LEN] = bytes.try_into().ok()?;
        EntityMappingKey::decode(&buf)
    }
}

impl FixedValue for DocRef {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.get().to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<DocRef> {
        DocRef::new(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}
