use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Durable document id assigned to a content-addressed entity.
///
/// Ids are minted once per unique (search type, content hash) pair and stay
/// valid across indexing runs. Id 0 means "no id" and is unrepresentable
/// here by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocRef(NonZeroU32);

impl DocRef {
    pub fn new(id: u32) -> Option<DocRef> {
        NonZeroU32::new(id).map(DocRef)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_valid_id() {
        assert_eq!(DocRef::new(0), None);
        assert_eq!(DocRef::new(1).map(DocRef::get), Some(1));
    }
}
