//! Shared domain types for Quarry's durable-identity core.
//!
//! Everything here is plain data: content hashes, stable document ids, and
//! the fixed-size keys used to address entity data in the durable store.
//! No I/O happens in this crate.

mod hash;
mod ids;
mod mapping_key;
mod search_type;

pub use hash::{PartitionedHash, ShortHash, SHORT_HASH_LEN};
pub use ids::DocRef;
pub use mapping_key::{AddressKind, EntityMappingKey, ENTITY_MAPPING_KEY_LEN};
pub use search_type::SearchType;
