use serde::{Deserialize, Serialize};

/// Category of indexed entity.
///
/// Every search type owns its own stable-id keyspace: the numeric id of the
/// type is folded into the first byte of an entity's content hash before the
/// hash is used as a store key, so entities of different types never collide
/// even when their content hashes are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SearchType {
    Definition = 0,
    Reference = 1,
    TextSource = 2,
    BoundSource = 3,
    Project = 4,
    Repository = 5,
    Commit = 6,
    Language = 7,
    Property = 8,
}

impl SearchType {
    /// All search types, in discriminant order.
    ///
    /// Callers that persist per-type state (counters, free lists) enumerate
    /// this before saving so every type present in a run gets an entry.
    pub const ALL: [SearchType; 9] = [
        SearchType::Definition,
        SearchType::Reference,
        SearchType::TextSource,
        SearchType::BoundSource,
        SearchType::Project,
        SearchType::Repository,
        SearchType::Commit,
        SearchType::Language,
        SearchType::Property,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<SearchType> {
        SearchType::ALL.get(value as usize).copied()
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SearchType::Definition => "definition",
            SearchType::Reference => "reference",
            SearchType::TextSource => "text-source",
            SearchType::BoundSource => "bound-source",
            SearchType::Project => "project",
            SearchType::Repository => "repository",
            SearchType::Commit => "commit",
            SearchType::Language => "language",
            SearchType::Property => "property",
        };
        f.write_str(name)
    }
}
