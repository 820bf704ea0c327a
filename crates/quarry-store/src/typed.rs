use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use quarry_vfs::FileSystem;

use crate::codec::{FixedKey, FixedValue};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{Store, StoreIter};

/// A [`Store`] with typed keys and values.
///
/// Record widths come from the codec traits; the rest of the configuration
/// (thresholds, WAL, merge behavior) is taken from the supplied config.
pub struct TypedStore<K, V> {
    store: Store,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: FixedKey, V: FixedValue> TypedStore<K, V> {
    /// Default configuration for this key/value pairing.
    pub fn config() -> StoreConfig {
        StoreConfig::new(K::ENCODED_LEN, V::ENCODED_LEN)
    }

    pub fn open(fs: Arc<dyn FileSystem>, mut config: StoreConfig) -> Result<TypedStore<K, V>> {
        config.key_len = K::ENCODED_LEN;
        config.value_len = V::ENCODED_LEN;
        Ok(TypedStore {
            store: Store::open(fs, config)?,
            _marker: PhantomData,
        })
    }

    pub fn upsert(&self, key: &K, value: &V) -> Result<()> {
        let mut key_buf = vec![0u8; K::ENCODED_LEN];
        let mut value_buf = vec![0u8; V::ENCODED_LEN];
        key.encode(&mut key_buf);
        value.encode(&mut value_buf);
        self.store.upsert(&key_buf, &value_buf)
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let mut key_buf = vec![0u8; K::ENCODED_LEN];
        key.encode(&mut key_buf);
        match self.store.get(&key_buf)? {
            Some(bytes) => V::decode(&bytes)
                .map(Some)
                .ok_or(StoreError::UndecodableRecord),
            None => Ok(None),
        }
    }

    /// Typed sorted cursor; see [`Store::iter`].
    pub fn iter(&self) -> Result<TypedIter<K, V>> {
        Ok(TypedIter {
            inner: self.store.iter()?,
            _marker: PhantomData,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn compact(&self) -> Result<()> {
        self.store.compact()
    }

    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        self.store.pending_deletions()
    }

    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

pub struct TypedIter<K, V> {
    inner: StoreIter,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: FixedKey, V: FixedValue> Iterator for TypedIter<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.and_then(|(key, value)| {
            let key = K::decode(&key).ok_or(StoreError::UndecodableRecord)?;
            let value = V::decode(&value).ok_or(StoreError::UndecodableRecord)?;
            Ok((key, value))
        }))
    }
}
