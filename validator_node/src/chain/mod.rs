//! Access to the chain endpoint the validator follows.

use async_trait::async_trait;
use ethers::types::{Address, Log, Transaction, H256};

mod ethers_client;

pub use ethers_client::EthersChainClient;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Transaction not found: {0:?}")]
    TransactionNotFound(H256),

    #[error("Sender recovery failed: {0}")]
    Recovery(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Read-only view of an EVM chain: logs, transactions and signers.
///
/// Every error is treated as transient by callers and retried on the next
/// poll.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number
    async fn block_number(&self) -> Result<u64>;

    /// Logs emitted by `addresses` from `from_block` (inclusive) to the head
    async fn filter_logs(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<Log>>;

    /// Transaction by hash
    async fn transaction(&self, hash: H256) -> Result<Transaction>;

    /// Signer of `tx`, using the signature scheme of its chain id
    fn recover_sender(&self, tx: &Transaction) -> Result<Address>;
}

/// RPC endpoint of a named chain
pub fn endpoint_for_chain(chain: &str) -> &'static str {
    match chain {
        "local" => "http://127.0.0.1:8545",
        "test" => "https://testchain.metamemo.one:24180",
        "product" => "https://chain.metamemo.one:8501",
        _ => "https://devchain.metamemo.one:8501",
    }
}
