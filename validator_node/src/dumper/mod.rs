//! Event ingestion: follows the registry and market contracts and folds
//! their logs into the database.
//!
//! Logs are fetched from the persisted cursor onwards and applied in order.
//! The first handler failure halts the batch and leaves the cursor at the
//! failing log's block, so the cursor never moves past an event that was
//! not applied. Delivery is at-least-once; replays of already stored
//! records are recognised and skipped.

use crate::chain::{ChainClient, ChainError};
use crate::common::Clock;
use crate::database::{Database, Node, Order, Profit, Provider, StoreError};
use ethers::types::{Address, Log, H256, U256};
use log::{debug, error, info, warn};
use num_bigint::{BigInt, BigUint};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub mod abi;
pub mod decoder;
pub mod events;
pub mod registry;

use decoder::{DecodeError, LogDecoder};
use events::{AddNodeEvent, CreateOrderEvent, RegisterEvent, WithdrawEvent};
use registry::EventRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DumperError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: U256 },
}

pub type Result<T> = std::result::Result<T, DumperError>;

/// Outcome of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Logs returned by the chain
    pub fetched: usize,
    /// Logs applied by a handler
    pub applied: usize,
    /// Logs with no registered handler
    pub skipped: usize,
    /// Block of the log whose handler failed, if the batch halted
    pub halted_at: Option<u64>,
    pub cursor: u64,
}

pub struct Dumper {
    chain: Arc<dyn ChainClient>,
    db: Database,
    decoder: LogDecoder,
    clock: Arc<dyn Clock>,
    contracts: Vec<Address>,
    block_number: AtomicU64,
    poll_interval: Duration,
    poll_lock: Mutex<()>,
}

impl Dumper {
    /// Build a dumper resuming from the persisted cursor (0 if none)
    pub async fn new(
        chain: Arc<dyn ChainClient>,
        db: Database,
        registry: Arc<EventRegistry>,
        clock: Arc<dyn Clock>,
        contracts: Vec<Address>,
    ) -> Result<Self> {
        let block_number = db.get_block_number().await?.unwrap_or(0);
        info!(
            "Dumper resuming at block {} for {} contracts",
            block_number,
            contracts.len()
        );

        Ok(Self {
            chain,
            db,
            decoder: LogDecoder::new(registry),
            clock,
            contracts,
            block_number: AtomicU64::new(block_number),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_lock: Mutex::new(()),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Next block to fetch from
    pub fn block_number(&self) -> u64 {
        self.block_number.load(Ordering::SeqCst)
    }

    /// Blocks between the cursor and the chain head
    pub async fn lag(&self) -> Result<u64> {
        let head = self.chain.block_number().await?;
        Ok(head.saturating_add(1).saturating_sub(self.block_number()))
    }

    pub fn contracts(&self) -> &[Address] {
        &self.contracts
    }

    /// Fetch and apply every log from the cursor to the head.
    ///
    /// Only a failed fetch or a failed cursor write is returned as an
    /// error; a handler failure halts the batch and is reported in the
    /// summary.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let _guard = self.poll_lock.lock().await;

        let start = self.block_number();
        let logs = self.chain.filter_logs(start, &self.contracts).await?;
        let mut summary = PollSummary {
            fetched: logs.len(),
            cursor: start,
            ..Default::default()
        };

        for log in &logs {
            let Some(name) = self.decoder.event_name(log) else {
                summary.skipped += 1;
                continue;
            };
            let block = log.block_number.map(|n| n.as_u64());

            let outcome = match name {
                "Register" => self.handle_register(log).await,
                "AddNode" => self.handle_add_node(log).await,
                "CreateOrder" => self.handle_create_order(log).await,
                "Withdraw" => self.handle_withdraw(log).await,
                other => {
                    debug!("No handler for {} event", other);
                    summary.skipped += 1;
                    continue;
                }
            };

            if let Err(e) = outcome {
                error!(
                    "Failed to handle {} event at block {:?} (tx {:?}): {}",
                    name, block, log.transaction_hash, e
                );
                summary.halted_at = block;
                // Re-fetch the whole failing block; its applied logs replay as no-ops.
                if let Some(block) = block {
                    summary.cursor = summary.cursor.min(block.max(start));
                    self.block_number.store(summary.cursor, Ordering::SeqCst);
                }
                break;
            }

            summary.applied += 1;
            if let Some(block) = block {
                if block >= summary.cursor {
                    summary.cursor = block + 1;
                }
            }
            self.block_number.store(summary.cursor, Ordering::SeqCst);
        }

        if summary.cursor > start {
            self.db.set_block_number(summary.cursor).await?;
            debug!("Cursor advanced {} -> {}", start, summary.cursor);
        }

        Ok(summary)
    }

    /// Poll until cancelled. Failed polls are logged and retried on the
    /// next tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Dumper polling every {:?}", self.poll_interval);

        loop {
            match self.poll_once().await {
                Ok(summary) if summary.applied > 0 => info!(
                    "Applied {} of {} logs, cursor now {}",
                    summary.applied, summary.fetched, summary.cursor
                ),
                Ok(_) => {}
                Err(e) => warn!("Poll failed: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Dumper stopped at block {}", self.block_number());
    }

    async fn handle_register(&self, log: &Log) -> Result<()> {
        let event: RegisterEvent = self.decoder.decode(log)?;
        info!("Register: provider {:?} ({})", event.cp, event.name);

        let provider = Provider {
            address: event.cp,
            name: event.name,
            ip: event.ip,
            domain: event.domain,
            port: event.port,
        };
        replayable(self.db.create_provider(&provider).await)?;

        let profit = Profit::empty(event.cp, self.clock.now());
        replayable(self.db.create_profit(&profit).await)?;
        Ok(())
    }

    async fn handle_add_node(&self, log: &Log) -> Result<()> {
        let event: AddNodeEvent = self.decoder.decode(log)?;
        info!("AddNode: provider {:?} node {}", event.cp, event.id);

        let node = Node {
            address: event.cp,
            id: event.id,
            cpu_price: to_biguint(event.cpu.price_sec),
            cpu_model: event.cpu.model,
            gpu_price: to_biguint(event.gpu.price_sec),
            gpu_model: event.gpu.model,
            mem_price: to_biguint(event.mem.price_sec),
            mem_capacity: event.mem.num,
            disk_price: to_biguint(event.disk.price_sec),
            disk_capacity: event.disk.num,
        };
        replayable(self.db.create_node(&node).await)
    }

    async fn handle_create_order(&self, log: &Log) -> Result<()> {
        let event: CreateOrderEvent = self.decoder.decode(log)?;
        info!(
            "CreateOrder: provider {:?} order {} node {}",
            event.cp, event.id, event.nid
        );

        // A missing renter is rejected by the store, which halts the batch
        // and retries the event on the next poll.
        let user = match log.transaction_hash {
            Some(hash) => match self.sender_of(hash).await {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Cannot resolve renter of order {}: {}", event.id, e);
                    None
                }
            },
            None => {
                warn!("CreateOrder log without transaction hash");
                None
            }
        };

        let order = Order::new(
            event.cp,
            event.id,
            event.nid,
            user,
            to_seconds("act", event.act)?,
            to_seconds("pro", event.pro)?,
            to_seconds("dur", event.dur)?,
        );
        replayable(self.db.create_order(&order).await)
    }

    async fn handle_withdraw(&self, log: &Log) -> Result<()> {
        let event: WithdrawEvent = self.decoder.decode(log)?;
        let amount = BigInt::from(to_biguint(event.amount));
        let position = log_position(log);

        let (profit, applied) = self
            .db
            .update_profit(&event.cp, |profit| {
                if let (Some(seen), Some(current)) = (profit.last_withdraw, position) {
                    if current <= seen {
                        return false;
                    }
                }
                profit.balance -= &amount;
                profit.nonce += 1;
                if position.is_some() {
                    profit.last_withdraw = position;
                }
                true
            })
            .await?;

        if applied {
            info!(
                "Withdraw: provider {:?} amount {}, balance {} nonce {}",
                event.cp, amount, profit.balance, profit.nonce
            );
        } else {
            warn!("Withdraw at {:?} for {:?} already applied", position, event.cp);
        }
        Ok(())
    }

    async fn sender_of(&self, hash: H256) -> Result<Address> {
        let tx = self.chain.transaction(hash).await?;
        Ok(self.chain.recover_sender(&tx)?)
    }
}

/// Treat an already stored record as a replayed event
fn replayable(result: crate::database::Result<()>) -> Result<()> {
    match result {
        Err(StoreError::Duplicate { kind, key }) => {
            warn!("Skipping replayed {} {}", kind, key);
            Ok(())
        }
        other => Ok(other?),
    }
}

fn log_position(log: &Log) -> Option<(u64, u64)> {
    Some((log.block_number?.as_u64(), log.log_index?.low_u64()))
}

pub(crate) fn to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

fn to_seconds(field: &'static str, value: U256) -> Result<i64> {
    if value > U256::from(i64::MAX as u64) {
        return Err(DumperError::OutOfRange { field, value });
    }
    Ok(value.as_u64() as i64)
}
