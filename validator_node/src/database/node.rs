use super::{address_key, Database, Result, StoreError};
use crate::common::decimal;
use ethers::types::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A resource node offered by a provider. Prices are per second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub id: u64,

    #[serde(with = "decimal::biguint")]
    pub cpu_price: BigUint,
    pub cpu_model: String,

    #[serde(with = "decimal::biguint")]
    pub gpu_price: BigUint,
    pub gpu_model: String,

    #[serde(with = "decimal::biguint")]
    pub mem_price: BigUint,
    pub mem_capacity: u64,

    #[serde(with = "decimal::biguint")]
    pub disk_price: BigUint,
    pub disk_capacity: u64,
}

fn node_key(address: &Address, id: u64) -> Vec<u8> {
    format!("node/{}/{:020}", address_key(address), id).into_bytes()
}

impl Database {
    pub async fn create_node(&self, node: &Node) -> Result<()> {
        self.insert_new("node", node_key(&node.address, node.id), node)
            .await
    }

    pub async fn get_node(&self, address: &Address, id: u64) -> Result<Node> {
        self.read(&node_key(address, id))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "node",
                key: format!("{:?}/{}", address, id),
            })
    }
}
