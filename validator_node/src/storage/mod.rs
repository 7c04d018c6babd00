use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Storage-specific Result type
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Storage error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub used_size: u64,
    pub num_entries: u64,
}

/// Byte-level key/value backend under the domain store.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    async fn delete(&self, key: &[u8]) -> Result<()>;
    async fn exists(&self, key: &[u8]) -> Result<bool>;
    async fn list_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;
    async fn get_stats(&self) -> Result<StorageStats>;
    async fn flush(&self) -> Result<()>;

    /// Values of every key under `prefix`
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for key in self.list_keys(prefix).await? {
            if let Some(value) = self.get(&key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_storage;

pub use memory::MemoryStorage;
#[cfg(feature = "rocksdb")]
pub use rocksdb_storage::RocksDbStorage;
