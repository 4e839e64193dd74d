//! Key-to-bytes map under a base key.

use crate::storage::context::StorageContext;
use crate::storage::keys::{count_key, entries_prefix, entry_key, split_entry};
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;

/// Map view over storage.
///
/// Entries live at `base<key>` and the entry count at `base{count}`.
/// Iteration follows the storage's key order; callers must not depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageMap {
    base_key: Vec<u8>,
}

impl StorageMap {
    pub fn new(base_key: impl Into<Vec<u8>>) -> Self {
        Self {
            base_key: base_key.into(),
        }
    }

    pub fn base_key(&self) -> &[u8] {
        &self.base_key
    }

    pub fn count(&self, storage: &dyn StorageContext) -> Result<u64, VMError> {
        read_count(storage, &self.base_key)
    }

    pub fn contains_key(&self, storage: &dyn StorageContext, key: &[u8]) -> bool {
        storage.has(&entry_key(&self.base_key, key))
    }

    pub fn get_raw(&self, storage: &dyn StorageContext, key: &[u8]) -> Option<Vec<u8>> {
        storage.get(&entry_key(&self.base_key, key))
    }

    pub fn get<T: Decode>(
        &self,
        storage: &dyn StorageContext,
        key: &[u8],
    ) -> Result<Option<T>, VMError> {
        match self.get_raw(storage, key) {
            Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_raw(
        &self,
        storage: &mut dyn StorageContext,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), VMError> {
        let entry = entry_key(&self.base_key, key);
        if !storage.has(&entry) {
            let count = self.count(storage)?;
            write_count(storage, &self.base_key, count + 1);
        }
        storage.put(&entry, value);
        Ok(())
    }

    pub fn set<T: Encode + ?Sized>(
        &self,
        storage: &mut dyn StorageContext,
        key: &[u8],
        value: &T,
    ) -> Result<(), VMError> {
        self.set_raw(storage, key, value.to_bytes())
    }

    /// Returns whether the key was present.
    pub fn remove(&self, storage: &mut dyn StorageContext, key: &[u8]) -> Result<bool, VMError> {
        let entry = entry_key(&self.base_key, key);
        if !storage.has(&entry) {
            return Ok(false);
        }
        storage.delete(&entry);
        let count = self.count(storage)?;
        write_count(storage, &self.base_key, count.saturating_sub(1));
        Ok(true)
    }

    pub fn clear(&self, storage: &mut dyn StorageContext) {
        for (key, _) in self.entries(storage) {
            storage.delete(&entry_key(&self.base_key, &key));
        }
        storage.delete(&count_key(&self.base_key));
    }

    /// Raw `(key, value)` pairs.
    pub fn entries(&self, storage: &dyn StorageContext) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        storage.visit(&entries_prefix(&self.base_key), &mut |key, value| {
            if let Some(entry) = split_entry(&self.base_key, key) {
                out.push((entry.to_vec(), value.to_vec()));
            }
        });
        out
    }

    pub fn all_keys(&self, storage: &dyn StorageContext) -> Vec<Vec<u8>> {
        self.entries(storage).into_iter().map(|(k, _)| k).collect()
    }

    pub fn all_values<T: Decode>(&self, storage: &dyn StorageContext) -> Result<Vec<T>, VMError> {
        self.entries(storage)
            .into_iter()
            .map(|(_, v)| T::from_bytes(&v).map_err(VMError::from))
            .collect()
    }
}

pub(crate) fn read_count(storage: &dyn StorageContext, base_key: &[u8]) -> Result<u64, VMError> {
    match storage.get(&count_key(base_key)) {
        Some(bytes) => Ok(u64::from_bytes(&bytes)?),
        None => Ok(0),
    }
}

pub(crate) fn write_count(storage: &mut dyn StorageContext, base_key: &[u8], count: u64) {
    let key = count_key(base_key);
    if count == 0 {
        storage.delete(&key);
    } else {
        storage.put(&key, count.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::context::MemoryStorage;
    use crate::storage::keys::field_key;

    fn balances() -> StorageMap {
        StorageMap::new(field_key("token", "balances"))
    }

    #[test]
    fn set_then_get() {
        let mut storage = MemoryStorage::new();
        let map = balances();
        map.set(&mut storage, b"alice", &100u64).unwrap();
        assert_eq!(map.get::<u64>(&storage, b"alice").unwrap(), Some(100));
        assert_eq!(map.get::<u64>(&storage, b"bob").unwrap(), None);
        assert!(storage.has(b"token.balances<alice>"));
    }

    #[test]
    fn count_tracks_distinct_keys() {
        let mut storage = MemoryStorage::new();
        let map = balances();
        map.set(&mut storage, b"a", &1u64).unwrap();
        map.set(&mut storage, b"a", &2u64).unwrap();
        map.set(&mut storage, b"b", &3u64).unwrap();
        assert_eq!(map.count(&storage).unwrap(), 2);

        assert!(map.remove(&mut storage, b"a").unwrap());
        assert!(!map.remove(&mut storage, b"a").unwrap());
        assert_eq!(map.count(&storage).unwrap(), 1);
        assert!(!map.contains_key(&storage, b"a"));
    }

    #[test]
    fn keys_and_values() {
        let mut storage = MemoryStorage::new();
        let map = balances();
        map.set_raw(&mut storage, b"x", vec![7]).unwrap();
        map.set_raw(&mut storage, b"y", vec![8]).unwrap();
        let mut keys = map.all_keys(&storage);
        keys.sort();
        assert_eq!(keys, vec![b"x".to_vec(), b"y".to_vec()]);
        let mut values: Vec<u8> = map.all_values(&storage).unwrap();
        values.sort();
        assert_eq!(values, vec![7, 8]);
    }

    #[test]
    fn clear_removes_everything_under_base() {
        let mut storage = MemoryStorage::with_data([("token.name", vec![1])]);
        let map = balances();
        map.set(&mut storage, b"a", &1u64).unwrap();
        map.set(&mut storage, b"b", &1u64).unwrap();
        map.clear(&mut storage);
        assert_eq!(map.count(&storage).unwrap(), 0);
        assert_eq!(storage.len(), 1);
    }
}
