use serde::{Deserialize, Serialize};

use crate::{DocRef, SearchType};

/// Encoded width of an [`EntityMappingKey`] in bytes.
pub const ENTITY_MAPPING_KEY_LEN: usize = 10;

/// Which slice of an entity's persisted data a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressKind {
    Content = 0,
    Definitions = 1,
    References = 2,
    Properties = 3,
}

impl AddressKind {
    pub const ALL: [AddressKind; 4] = [
        AddressKind::Content,
        AddressKind::Definitions,
        AddressKind::References,
        AddressKind::Properties,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<AddressKind> {
        AddressKind::ALL.get(value as usize).copied()
    }
}

/// Compact fixed-size key addressing one sub-range of an entity's blob
/// storage.
///
/// The encoded form sorts byte-wise in (search type, qualifier, address
/// kind) order first and by stable id last, so all blobs of one kind for one
/// type sit in a contiguous key range. Integer fields are big-endian for
/// exactly that reason; see [`EntityMappingKey::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityMappingKey {
    pub search_type: SearchType,
    /// Optional scoping id (e.g. the owning project), `None` for global
    /// entities. Sorts before all qualified keys.
    pub qualifier: Option<DocRef>,
    pub address_kind: AddressKind,
    pub stable_id: DocRef,
}

impl EntityMappingKey {
    pub fn new(
        search_type: SearchType,
        qualifier: Option<DocRef>,
        address_kind: AddressKind,
        stable_id: DocRef,
    ) -> EntityMappingKey {
        EntityMappingKey {
            search_type,
            qualifier,
            address_kind,
            stable_id,
        }
    }

    /// Fixed-width big-endian encoding.
    ///
    /// Layout: `type:1 | qualifier:4 | kind:1 | stable_id:4`. Big-endian
    /// integers make the byte-wise ordering of encoded keys match the
    /// semantic (type, qualifier, kind, stable id) ordering; an absent
    /// qualifier encodes as 0, which no [`DocRef`] can occupy.
    pub fn encode(&self, out: &mut [u8; ENTITY_MAPPING_KEY_LEN]) {
        out[0] = self.search_type.as_u8();
        let qualifier = self.qualifier.map(DocRef::get).unwrap_or(0);
        out[1..5].copy_from_slice(&qualifier.to_be_bytes());
        out[5] = self.address_kind.as_u8();
        out[6..10].copy_from_slice(&self.stable_id.get().to_be_bytes());
    }

    pub fn decode(bytes: &[u8; ENTITY_MAPPING_KEY_LEN]) -> Option<EntityMappingKey> {
        let search_type = SearchType::from_u8(bytes[0])?;
        let qualifier = u32::from_be_bytes(bytes[1..5].try_into().expect("qualifier field"));
        let address_kind = AddressKind::from_u8(bytes[5])?;
        let stable_id = u32::from_be_bytes(bytes[6..10].try_into().expect("stable id field"));
        Some(EntityMappingKey {
            search_type,
            qualifier: DocRef::new(qualifier),
            address_kind,
            stable_id: DocRef::new(stable_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(
        ty: SearchType,
        qualifier: Option<u32>,
        kind: AddressKind,
        stable_id: u32,
    ) -> EntityMappingKey {
        EntityMappingKey::new(
            ty,
            qualifier.and_then(DocRef::new),
            kind,
            DocRef::new(stable_id).unwrap(),
        )
    }

    fn encoded(key: &EntityMappingKey) -> [u8; ENTITY_MAPPING_KEY_LEN] {
        let mut out = [0u8; ENTITY_MAPPING_KEY_LEN];
        key.encode(&mut out);
        out
    }

    #[test]
    fn round_trips() {
        let original = key(
            SearchType::Reference,
            Some(7),
            AddressKind::References,
            42,
        );
        let decoded = EntityMappingKey::decode(&encoded(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn byte_order_groups_by_type_qualifier_kind_then_id() {
        // Semantic order of the tuple must match byte-wise order of the
        // encoding, since the store compares raw key bytes.
        let keys = [
            key(SearchType::Definition, None, AddressKind::Content, 9),
            key(SearchType::Definition, Some(1), AddressKind::Content, 2),
            key(SearchType::Definition, Some(1), AddressKind::Definitions, 1),
            key(SearchType::Definition, Some(2), AddressKind::Content, 1),
            key(SearchType::Reference, None, AddressKind::Content, 1),
        ];
        let mut encodings: Vec<_> = keys.iter().map(encoded).collect();
        let semantic_order = encodings.clone();
        encodings.sort();
        assert_eq!(encodings, semantic_order);
    }

    #[test]
    fn stable_id_orders_within_a_group() {
        let low = key(SearchType::Project, Some(3), AddressKind::Content, 5);
        let high = key(SearchType::Project, Some(3), AddressKind::Content, 300);
        assert!(encoded(&low) < encoded(&high));
    }

    #[test]
    fn decode_rejects_zero_stable_id() {
        let mut bytes = encoded(&key(SearchType::Project, None, AddressKind::Content, 1));
        bytes[6..10].copy_from_slice(&0u32.to_be_bytes());
        assert_eq!(EntityMappingKey::decode(&bytes), None);
    }
}
