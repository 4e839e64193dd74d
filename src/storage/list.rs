//! Index-addressed sequence under a base key.

use crate::storage::context::StorageContext;
use crate::storage::keys::{count_key, index_key};
use crate::storage::map::{read_count, write_count};
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;

/// List view over storage.
///
/// Element `i` lives at `base<i as u64 big-endian>` and the length at
/// `base{count}`. `remove_at` shifts every later element down one slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageList {
    base_key: Vec<u8>,
}

impl StorageList {
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

    fn check_index(&self, storage: &dyn StorageContext, index: u64) -> Result<(), VMError> {
        let count = self.count(storage)?;
        if index >= count {
            return Err(VMError::IndexOutOfRange {
                index: index.to_string(),
                count: count as usize,
            });
        }
        Ok(())
    }

    pub fn add_raw(&self, storage: &mut dyn StorageContext, value: Vec<u8>) -> Result<u64, VMError> {
        let index = self.count(storage)?;
        storage.put(&index_key(&self.base_key, index), value);
        write_count(storage, &self.base_key, index + 1);
        Ok(index)
    }

    /// Appends and returns the new element's index.
    pub fn add<T: Encode + ?Sized>(
        &self,
        storage: &mut dyn StorageContext,
        value: &T,
    ) -> Result<u64, VMError> {
        self.add_raw(storage, value.to_bytes())
    }

    pub fn get_raw(&self, storage: &dyn StorageContext, index: u64) -> Result<Vec<u8>, VMError> {
        let count = self.count(storage)?;
        storage
            .get(&index_key(&self.base_key, index))
            .filter(|_| index < count)
            .ok_or_else(|| VMError::IndexOutOfRange {
                index: index.to_string(),
                count: count as usize,
            })
    }

    pub fn get<T: Decode>(&self, storage: &dyn StorageContext, index: u64) -> Result<T, VMError> {
        Ok(T::from_bytes(&self.get_raw(storage, index)?)?)
    }

    pub fn replace_raw(
        &self,
        storage: &mut dyn StorageContext,
        index: u64,
        value: Vec<u8>,
    ) -> Result<(), VMError> {
        self.check_index(storage, index)?;
        storage.put(&index_key(&self.base_key, index), value);
        Ok(())
    }

    pub fn replace<T: Encode + ?Sized>(
        &self,
        storage: &mut dyn StorageContext,
        index: u64,
        value: &T,
    ) -> Result<(), VMError> {
        self.replace_raw(storage, index, value.to_bytes())
    }

    /// Removes element `index`, moving every later element down one slot.
    pub fn remove_at(&self, storage: &mut dyn StorageContext, index: u64) -> Result<(), VMError> {
        self.check_index(storage, index)?;
        let count = self.count(storage)?;
        for i in index + 1..count {
            if let Some(next) = storage.get(&index_key(&self.base_key, i)) {
                storage.put(&index_key(&self.base_key, i - 1), next);
            }
        }
        storage.delete(&index_key(&self.base_key, count - 1));
        write_count(storage, &self.base_key, count - 1);
        Ok(())
    }

    pub fn clear(&self, storage: &mut dyn StorageContext) -> Result<(), VMError> {
        let count = self.count(storage)?;
        for i in 0..count {
            storage.delete(&index_key(&self.base_key, i));
        }
        storage.delete(&count_key(&self.base_key));
        Ok(())
    }

    pub fn all_raw(&self, storage: &dyn StorageContext) -> Result<Vec<Vec<u8>>, VMError> {
        (0..self.count(storage)?)
            .map(|i| self.get_raw(storage, i))
            .collect()
    }

    pub fn all<T: Decode>(&self, storage: &dyn StorageContext) -> Result<Vec<T>, VMError> {
        (0..self.count(storage)?).map(|i| self.get(storage, i)).collect()
    }
}
