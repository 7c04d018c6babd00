use super::{ChainClient, ChainError, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::convert::TryFrom;

/// [`ChainClient`] over an HTTP JSON-RPC endpoint
pub struct EthersChainClient {
    provider: Provider<Http>,
    endpoint: String,
}

impl EthersChainClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::InvalidEndpoint(format!("{}: {}", rpc_url, e)))?;

        Ok(Self {
            provider,
            endpoint: rpc_url.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn block_number(&self) -> Result<u64> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get block number: {}", e)))?;
        Ok(head.as_u64())
    }

    async fn filter_logs(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(BlockNumber::Latest)
            .address(addresses.to_vec());

        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to filter logs: {}", e)))
    }

    async fn transaction(&self, hash: H256) -> Result<Transaction> {
        self.provider
            .get_transaction(hash)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get transaction: {}", e)))?
            .ok_or(ChainError::TransactionNotFound(hash))
    }

    fn recover_sender(&self, tx: &Transaction) -> Result<Address> {
        // recover_from picks the EIP-155 / typed-tx sighash from tx.chain_id
        tx.recover_from()
            .map_err(|e| ChainError::Recovery(format!("{:?}: {}", tx.hash, e)))
    }
}
