//! Single-slot storage value.

use crate::storage::context::StorageContext;
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;

/// One value stored at its base key. Reading an unset value yields `None`;
/// there is no implicit default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageValue {
    key: Vec<u8>,
}

impl StorageValue {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn has_value(&self, storage: &dyn StorageContext) -> bool {
        storage.has(&self.key)
    }

    pub fn get<T: Decode>(&self, storage: &dyn StorageContext) -> Result<Option<T>, VMError> {
        match storage.get(&self.key) {
            Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Encode + ?Sized>(&self, storage: &mut dyn StorageContext, value: &T) {
        storage.put(&self.key, value.to_bytes());
    }

    pub fn get_raw(&self, storage: &dyn StorageContext) -> Option<Vec<u8>> {
        storage.get(&self.key)
    }

    pub fn set_raw(&self, storage: &mut dyn StorageContext, value: Vec<u8>) {
        storage.put(&self.key, value);
    }

    pub fn clear(&self, storage: &mut dyn StorageContext) {
        storage.delete(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::context::MemoryStorage;
    use crate::storage::keys::field_key;
    use num_bigint::BigInt;

    #[test]
    fn absent_until_set() {
        let mut storage = MemoryStorage::new();
        let value = StorageValue::new(field_key("token", "supply"));
        assert!(!value.has_value(&storage));
        assert_eq!(value.get::<BigInt>(&storage).unwrap(), None);

        value.set(&mut storage, &BigInt::from(1_000_000));
        assert_eq!(value.get::<BigInt>(&storage).unwrap(), Some(BigInt::from(1_000_000)));
        assert!(storage.has(b"token.supply"));

        value.clear(&mut storage);
        assert!(!value.has_value(&storage));
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let mut storage = MemoryStorage::new();
        let value = StorageValue::new(b"x".to_vec());
        value.set_raw(&mut storage, vec![1]);
        assert!(matches!(value.get::<u64>(&storage), Err(VMError::Decode(_))));
    }
}
