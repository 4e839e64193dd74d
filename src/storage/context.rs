//! Byte-keyed storage the engine reads and writes through.
//!
//! [`StorageContext`] is the only storage interface the VM and the
//! collections see. [`MemoryStorage`] keeps everything in an ordered map;
//! [`ChangeSet`] buffers one transaction's writes over a base storage so the
//! caller can commit or discard them as a whole.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered key-value storage.
///
/// Writes are visible to subsequent reads immediately.
pub trait StorageContext {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Stores a key-value pair, overwriting any existing value.
    fn put(&mut self, key: &[u8], value: Vec<u8>);
    /// Removes a key from storage.
    fn delete(&mut self, key: &[u8]);

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Calls `visitor` for every entry whose key starts with `prefix`, in
    /// key order.
    fn visit(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8]));
}

/// Entries of `map` whose key starts with `prefix`.
fn prefixed<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a V)> {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
}

/// In-memory storage backed by a `BTreeMap`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data<K: Into<Vec<u8>>>(data: impl IntoIterator<Item = (K, Vec<u8>)>) -> Self {
        Self {
            data: data.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.data.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Applies buffered writes: `Some` stores, `None` deletes.
    pub fn apply(&mut self, writes: Vec<(Vec<u8>, Option<Vec<u8>>)>) {
        for (key, value) in writes {
            match value {
                Some(value) => {
                    self.data.insert(key, value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }
}

impl StorageContext for MemoryStorage {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.data.insert(key.to_vec(), value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    fn has(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    fn visit(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8])) {
        for (key, value) in prefixed(&self.data, prefix) {
            visitor(key, value);
        }
    }
}

/// Write-buffering overlay on top of a base storage.
///
/// Reads fall through to the base for keys not yet written.
pub struct ChangeSet<'a> {
    base: &'a dyn StorageContext,
    /// Pending writes: `Some(value)` for insertions, `None` for deletions.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> ChangeSet<'a> {
    pub fn new(base: &'a dyn StorageContext) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Consumes the overlay and returns the pending writes in key order.
    pub fn into_writes(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.writes.into_iter().collect()
    }
}

impl StorageContext for ChangeSet<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(written) => written.clone(),
            None => self.base.get(key),
        }
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.writes.insert(key.to_vec(), Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn visit(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8])) {
        let mut merged = BTreeMap::new();
        self.base.visit(prefix, &mut |key, value| {
            merged.insert(key.to_vec(), value.to_vec());
        });
        for (key, written) in prefixed(&self.writes, prefix) {
            match written {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        for (key, value) in &merged {
            visitor(key, value);
        }
    }
}
