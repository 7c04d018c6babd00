use super::{Result, Storage, StorageError, StorageStats};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;

/// RocksDB-backed storage for a single validator process
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::ConnectionError(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl Storage for RocksDbStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadError(e.to_string()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::WriteError(e.to_string()))
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.db
            .delete(key)
            .map_err(|e| StorageError::WriteError(e.to_string()))
    }

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn list_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StorageError::ReadError(format!("DB iteration error: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }

        Ok(keys)
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StorageError::ReadError(e.to_string()))?;
            stats.num_entries += 1;
            stats.used_size += value.len() as u64;
        }
        Ok(stats)
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| StorageError::WriteError(format!("Failed to flush RocksDB: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.put(b"meta/block_number", b"42").await.unwrap();
            storage.flush().await.unwrap();
        }

        let storage = RocksDbStorage::open(dir.path()).unwrap();
        assert_eq!(
            storage.get(b"meta/block_number").await.unwrap(),
            Some(b"42".to_vec())
        );
    }

    #[tokio::test]
    async fn test_prefix_iteration_stops_at_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        storage.put(b"node/a", b"1").await.unwrap();
        storage.put(b"order/a", b"2").await.unwrap();
        storage.put(b"order/b", b"3").await.unwrap();
        storage.put(b"profit/a", b"4").await.unwrap();

        let keys = storage.list_keys(b"order/").await.unwrap();
        assert_eq!(keys, vec![b"order/a".to_vec(), b"order/b".to_vec()]);
    }
}
