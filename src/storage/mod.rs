//! Contract storage.
//!
//! - [`context`]: the [`StorageContext`](context::StorageContext) trait, an
//!   in-memory implementation and the [`ChangeSet`](context::ChangeSet) overlay
//! - [`keys`]: the `{contract}.{field}` key scheme and collection suffixes
//! - [`value`], [`map`], [`list`]: collection views computed purely from a
//!   base key

pub mod context;
pub mod keys;
pub mod list;
pub mod map;
pub mod value;

pub use context::{ChangeSet, MemoryStorage, StorageContext};
pub use list::StorageList;
pub use map::StorageMap;
pub use value::StorageValue;
