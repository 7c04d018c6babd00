use super::{address_key, Database, Result, StoreError};
use crate::common::decimal;
use ethers::types::Address;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Reward schedule and balances of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profit {
    pub address: Address,
    /// Matured, withdrawable amount
    #[serde(with = "decimal::bigint")]
    pub balance: BigInt,
    /// Amount still accruing until `end_time`
    #[serde(with = "decimal::bigint")]
    pub profit: BigInt,
    /// Total penalties applied so far
    #[serde(with = "decimal::bigint")]
    pub penalty: BigInt,
    /// Schedule position, unix seconds
    pub last_time: i64,
    pub end_time: i64,
    /// Bumped on every withdrawal; embedded in withdraw signatures
    pub nonce: u64,
    /// (block, log index) of the last applied Withdraw event
    #[serde(default)]
    pub last_withdraw: Option<(u64, u64)>,
}

impl Profit {
    /// Zeroed schedule starting and ending at `now`
    pub fn empty(address: Address, now: i64) -> Self {
        Self {
            address,
            balance: BigInt::from(0),
            profit: BigInt::from(0),
            penalty: BigInt::from(0),
            last_time: now,
            end_time: now,
            nonce: 0,
            last_withdraw: None,
        }
    }
}

fn profit_key(address: &Address) -> Vec<u8> {
    format!("profit/{}", address_key(address)).into_bytes()
}

impl Database {
    pub async fn create_profit(&self, profit: &Profit) -> Result<()> {
        self.insert_new("profit", profit_key(&profit.address), profit)
            .await
    }

    pub async fn get_profit(&self, address: &Address) -> Result<Profit> {
        self.read(&profit_key(address))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "profit",
                key: format!("{:?}", address),
            })
    }

    /// Atomically load, modify and persist a provider's profit row.
    ///
    /// Returns the stored row and whatever `f` returned.
    pub async fn update_profit<F, T>(&self, address: &Address, f: F) -> Result<(Profit, T)>
    where
        F: FnOnce(&mut Profit) -> T + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let key = profit_key(address);
        let mut profit: Profit = self.read(&key).await?.ok_or_else(|| StoreError::NotFound {
            kind: "profit",
            key: format!("{:?}", address),
        })?;

        let out = f(&mut profit);
        profit.address = *address;
        self.write(&key, &profit).await?;
        Ok((profit, out))
    }
}
