/// Tuning and record-shape configuration for a [`crate::Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Fixed key width in bytes.
    pub key_len: usize,
    /// Fixed value width in bytes.
    pub value_len: usize,
    /// The mutable segment is flushed to an immutable on-disk segment once
    /// its contents reach this many bytes.
    pub flush_threshold_bytes: usize,
    /// Write-ahead logging. Off by default: identity mappings are
    /// reconstructible by re-running analysis, so the throughput win is
    /// worth the relaxed durability.
    pub wal: bool,
    /// Fold all immutable segments into one when the store closes. Disable
    /// in environments that cannot afford the merge at shutdown.
    pub merge_on_close: bool,
}

impl StoreConfig {
    pub fn new(key_len: usize, value_len: usize) -> StoreConfig {
        assert!(key_len > 0, "key width must be non-zero");
        StoreConfig {
            key_len,
            value_len,
            flush_threshold_bytes: 4 * 1024 * 1024,
            wal: false,
            merge_on_close: true,
        }
    }

    pub(crate) fn record_len(&self) -> usize {
        self.key_len + self.value_len
    }
}
