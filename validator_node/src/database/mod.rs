//! Domain records and the cursor, persisted over a [`Storage`] backend.
//!
//! Records are JSON under prefixed keys. All creates reject an existing
//! key, and every read-modify-write runs under a single write lock so that
//! ingestion and settlement never lose each other's updates.

use crate::storage::{Storage, StorageError};
use ethers::types::Address;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

mod node;
mod order;
mod profit;
mod provider;

pub use node::Node;
pub use order::Order;
pub use profit::Profit;
pub use provider::Provider;

const BLOCK_NUMBER_KEY: &[u8] = b"meta/block_number";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Typed store for providers, nodes, orders, profits and the ingestion cursor
#[derive(Clone)]
pub struct Database {
    storage: Arc<dyn Storage>,
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Last persisted block cursor; `None` when never written
    pub async fn get_block_number(&self) -> Result<Option<u64>> {
        match self.storage.get(BLOCK_NUMBER_KEY).await? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::ReadError(format!("corrupt block number ({} bytes)", bytes.len()))
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    pub async fn set_block_number(&self, block_number: u64) -> Result<()> {
        self.storage
            .put(BLOCK_NUMBER_KEY, &block_number.to_be_bytes())
            .await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.storage.flush().await?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.storage.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize + Sync>(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.storage.put(key, &bytes).await?;
        Ok(())
    }

    /// Insert under `key` unless it is already taken
    async fn insert_new<T: Serialize + Sync>(&self, kind: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.storage.exists(&key).await? {
            return Err(StoreError::Duplicate {
                kind,
                key: String::from_utf8_lossy(&key).into_owned(),
            });
        }
        self.write(&key, value).await
    }

    async fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        self.storage
            .scan_prefix(prefix)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }
}

pub(crate) fn address_key(address: &Address) -> String {
    hex::encode(address.as_bytes())
}
