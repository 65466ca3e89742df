use std::collections::HashMap;

use parking_lot::RwLock;

use crate::StoreError;

/// The persistence collaborator: a durable key-value store.
///
/// Writes passed to [`write_batch`](BlockStore::write_batch) must become visible
/// atomically, so a crash never leaves a block stored without its index entries.
pub trait BlockStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write_batch(vec![(key.to_vec(), value.to_vec())])
    }
}

/// Keeps everything in memory. Used by tests and the simulator network.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl BlockStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        self.entries.write().extend(batch);
        Ok(())
    }
}

#[cfg(feature = "sled")]
mod sled_store {
    use std::path::Path;

    use crate::{BlockStore, StoreError};

    /// A store backed by an embedded sled database.
    #[derive(Debug, Clone)]
    pub struct SledStore {
        db: sled::Db,
    }

    impl SledStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
            Ok(Self {
                db: sled::open(path)?,
            })
        }

        pub fn temporary() -> Result<Self, StoreError> {
            Ok(Self {
                db: sled::Config::new().temporary(true).open()?,
            })
        }
    }

    impl BlockStore for SledStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.db.get(key)?.map(|value| value.to_vec()))
        }

        fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
            let mut sled_batch = sled::Batch::default();
            for (key, value) in batch {
                sled_batch.insert(key, value);
            }
            self.db.apply_batch(sled_batch)?;
            self.db.flush()?;
            Ok(())
        }
    }
}

#[cfg(feature = "sled")]
pub use sled_store::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put(b"a", b"1")?;
        store.write_batch(vec![(b"b".to_vec(), b"2".to_vec()), (b"a".to_vec(), b"3".to_vec())])?;

        assert_eq!(store.get(b"a")?, Some(b"3".to_vec()));
        assert_eq!(store.get(b"b")?, Some(b"2".to_vec()));
        assert_eq!(store.get(b"c")?, None);
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[cfg(feature = "sled")]
    #[test]
    fn test_sled_store() -> anyhow::Result<()> {
        let store = SledStore::temporary()?;
        store.write_batch(vec![(b"key".to_vec(), b"value".to_vec())])?;
        assert_eq!(store.get(b"key")?, Some(b"value".to_vec()));
        assert_eq!(store.get(b"missing")?, None);
        Ok(())
    }
}
