use super::{address_key, Database, Result, StoreError};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub address: Address,
    pub name: String,
    pub ip: String,
    pub domain: String,
    pub port: String,
}

fn provider_key(address: &Address) -> Vec<u8> {
    format!("provider/{}", address_key(address)).into_bytes()
}

impl Database {
    pub async fn create_provider(&self, provider: &Provider) -> Result<()> {
        self.insert_new("provider", provider_key(&provider.address), provider)
            .await
    }

    pub async fn get_provider(&self, address: &Address) -> Result<Provider> {
        self.read(&provider_key(address))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "provider",
                key: format!("{:?}", address),
            })
    }
}
