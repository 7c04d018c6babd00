#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, Log, Transaction, H256, U256, U64};
use grid_validator::chain::{ChainClient, ChainError};
use grid_validator::common::Clock;
use grid_validator::dumper::registry::EventRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub const REGISTRY: Address = Address::repeat_byte(0xaa);
pub const MARKET: Address = Address::repeat_byte(0xbb);

/// Chain double serving a fixed log list and known transactions
#[derive(Default)]
pub struct ScriptedChain {
    logs: Mutex<Vec<Log>>,
    senders: Mutex<HashMap<H256, Address>>,
    fail_next: AtomicBool,
    last_from: AtomicU64,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn add_sender(&self, tx_hash: H256, sender: Address) {
        self.senders.lock().unwrap().insert(tx_hash, sender);
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_from_block(&self) -> u64 {
        self.last_from.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|log| log.block_number)
            .map(|n| n.as_u64())
            .max()
            .unwrap_or(0))
    }

    async fn filter_logs(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<Log>, ChainError> {
        self.last_from.store(from_block, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ChainError::Rpc("connection refused".to_string()));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.block_number.map_or(0, |n| n.as_u64()) >= from_block)
            .filter(|log| addresses.contains(&log.address))
            .cloned()
            .collect())
    }

    async fn transaction(&self, hash: H256) -> Result<Transaction, ChainError> {
        if self.senders.lock().unwrap().contains_key(&hash) {
            Ok(Transaction {
                hash,
                ..Default::default()
            })
        } else {
            Err(ChainError::TransactionNotFound(hash))
        }
    }

    fn recover_sender(&self, tx: &Transaction) -> Result<Address, ChainError> {
        self.senders
            .lock()
            .unwrap()
            .get(&tx.hash)
            .copied()
            .ok_or_else(|| ChainError::Recovery("unknown transaction".to_string()))
    }
}

/// Clock following tokio's (possibly paused) time from `base`
pub struct TokioClock {
    base: i64,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: i64) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> i64 {
        self.base + self.start.elapsed().as_secs() as i64
    }
}

pub fn tx_hash(block: u64, index: u64) -> H256 {
    H256::from_low_u64_be(block * 1_000 + index)
}

/// Log from `contract` for a bundled event, indexed provider first
pub fn event_log(
    contract: Address,
    name: &str,
    cp: Address,
    payload: Vec<Token>,
    block: u64,
    index: u64,
) -> Log {
    let registry = EventRegistry::grid().unwrap();
    Log {
        address: contract,
        topics: vec![registry.signature_of(name).unwrap(), H256::from(cp)],
        data: Bytes::from(encode(&payload)),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(tx_hash(block, index)),
        log_index: Some(U256::from(index)),
        ..Default::default()
    }
}

pub fn register_log(cp: Address, name: &str, block: u64, index: u64) -> Log {
    event_log(
        REGISTRY,
        "Register",
        cp,
        vec![
            Token::String(name.to_string()),
            Token::String("10.0.0.1".to_string()),
            Token::String(format!("{}.grid.example", name)),
            Token::String("8080".to_string()),
        ],
        block,
        index,
    )
}

pub fn add_node_log(cp: Address, id: u64, cpu_price: U256, block: u64, index: u64) -> Log {
    let model = |price: U256, model: &str| {
        Token::Tuple(vec![
            Token::Uint(price.saturating_mul(U256::from(2_592_000u64))),
            Token::Uint(price),
            Token::String(model.to_string()),
        ])
    };
    let capacity = |price: u64, num: u64| {
        Token::Tuple(vec![
            Token::Uint(U256::from(price * 2_592_000)),
            Token::Uint(U256::from(price)),
            Token::Uint(U256::from(num)),
        ])
    };
    event_log(
        REGISTRY,
        "AddNode",
        cp,
        vec![
            Token::Uint(U256::from(id)),
            model(cpu_price, "AMD 7309"),
            model(U256::from(20u64), "RTX 4090"),
            capacity(3, 64),
            capacity(1, 2048),
        ],
        block,
        index,
    )
}

pub fn create_order_log(cp: Address, id: u64, nid: u64, act: u64, block: u64, index: u64) -> Log {
    event_log(
        MARKET,
        "CreateOrder",
        cp,
        vec![
            Token::Uint(U256::from(id)),
            Token::Uint(U256::from(nid)),
            Token::Uint(U256::from(act)),
            Token::Uint(U256::from(30u64)),
            Token::Uint(U256::from(3_600u64)),
        ],
        block,
        index,
    )
}

pub fn withdraw_log(cp: Address, amount: u64, block: u64, index: u64) -> Log {
    event_log(
        MARKET,
        "Withdraw",
        cp,
        vec![Token::Uint(U256::from(amount))],
        block,
        index,
    )
}
