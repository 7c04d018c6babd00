//! Epoch scheduler: challenges active nodes every cycle, collects proof
//! results during the prove window and settles provider profits.

use crate::common::{Clock, SystemClock};
use crate::database::{Database, StoreError};
use crate::types::{NodeId, ProofResult};
use ethers::types::Address;
use log::{debug, error, info, warn};
use num_bigint::BigUint;
use secp256k1::{All, Secp256k1, SecretKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod challenge;
pub mod phase;
pub mod settlement;
pub mod signature;

pub use challenge::{Challenge, ChallengeSource, RandomChallenge};
pub use phase::{Alignment, Intervals, Phase};
pub use settlement::{settle, Settlement};

pub const DEFAULT_RESULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid intervals: {0}")]
    InvalidIntervals(String),

    #[error("challenge generation failed: {0}")]
    Challenge(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("result queue closed")]
    QueueClosed,

    #[error("scheduler task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Handle for submitting proof results to a running validator
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<ProofResult>,
}

impl ResultSender {
    /// Queue a result, waiting for capacity
    pub async fn submit(&self, result: ProofResult) -> Result<()> {
        self.tx
            .send(result)
            .await
            .map_err(|_| ValidatorError::QueueClosed)
    }

    /// Queue a result without waiting; a full queue drops it
    pub fn try_submit(&self, result: ProofResult) -> Result<bool> {
        match self.tx.try_send(result) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ValidatorError::QueueClosed),
        }
    }
}

/// Bounded result queue feeding a [`GridValidator`]
pub fn result_channel(capacity: usize) -> (ResultSender, mpsc::Receiver<ProofResult>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ResultSender { tx }, rx)
}

pub struct GridValidator {
    db: Database,
    intervals: Intervals,
    clock: Arc<dyn Clock>,
    challenge_source: Arc<dyn ChallengeSource>,
    challenge: RwLock<Option<Challenge>>,
    last: AtomicI64,
    results: Mutex<mpsc::Receiver<ProofResult>>,
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    address: Address,
}

impl GridValidator {
    pub fn new(
        db: Database,
        secret_key: SecretKey,
        intervals: Intervals,
        results: mpsc::Receiver<ProofResult>,
    ) -> Self {
        let secp = Secp256k1::new();
        let address = signature::address_of(&secp, &secret_key);

        Self {
            db,
            intervals,
            clock: Arc::new(SystemClock),
            challenge_source: Arc::new(RandomChallenge),
            challenge: RwLock::new(None),
            last: AtomicI64::new(0),
            results: Mutex::new(results),
            secp,
            secret_key,
            address,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_challenge_source(mut self, source: Arc<dyn ChallengeSource>) -> Self {
        self.challenge_source = source;
        self
    }

    /// Address matching the signing key
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn intervals(&self) -> Intervals {
        self.intervals
    }

    pub fn cycle_length(&self) -> Duration {
        Duration::from_secs(self.intervals.cycle_secs() as u64)
    }

    /// Start of the cycle the scheduler is aligned to
    pub fn last_anchor(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> Phase {
        self.intervals.phase_at(self.clock.now(), self.last_anchor())
    }

    pub fn is_prove_time(&self) -> bool {
        self.intervals.is_prove_time(self.clock.now(), self.last_anchor())
    }

    pub async fn current_challenge(&self) -> Option<Challenge> {
        *self.challenge.read().await
    }

    /// Spawn the scheduling loop under a child of `parent`
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> SchedulerHandle {
        let token = parent.child_token();
        let validator = Arc::clone(self);
        let loop_token = token.clone();
        let join = tokio::spawn(async move { validator.run(loop_token).await });
        SchedulerHandle { token, join }
    }

    /// Scheduling loop; returns once `shutdown` fires outside settlement
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Validator {:?} scheduling: prepare {:?}, prove {:?}, wait {:?}",
            self.address,
            self.intervals.prepare(),
            self.intervals.prove(),
            self.intervals.wait()
        );

        while !shutdown.is_cancelled() {
            let to_prepare = self
                .intervals
                .wait_to_prepare(self.clock.now(), self.last_anchor());
            self.last.store(to_prepare.anchor, Ordering::SeqCst);
            debug!("Waiting {}s for prepare phase", to_prepare.wait);
            if !pause(to_prepare.wait_duration(), &shutdown).await {
                break;
            }

            if let Err(e) = self.refresh_challenge().await {
                warn!("Keeping previous challenge: {}", e);
            }

            let to_prove = self
                .intervals
                .wait_to_prove(self.clock.now(), self.last_anchor());
            self.last.store(to_prove.anchor, Ordering::SeqCst);
            debug!("Waiting {}s for prove phase", to_prove.wait);
            if !pause(to_prove.wait_duration(), &shutdown).await {
                break;
            }

            let nodes = match self.get_challenge_nodes().await {
                Ok(nodes) => nodes,
                Err(e) => {
                    error!("Failed to list challenged nodes: {}", e);
                    continue;
                }
            };

            let results = self.handle_result(nodes, &shutdown).await;
            if shutdown.is_cancelled() {
                break;
            }

            info!("Settling {} nodes", results.len());
            if let Err(e) = self.add_penalty(&results).await {
                error!("Settlement aborted: {}", e);
                continue;
            }

            self.last.store(to_prepare.next, Ordering::SeqCst);
        }

        info!("Validator stopped");
    }

    async fn refresh_challenge(&self) -> Result<()> {
        let challenge = self.challenge_source.generate_challenge().await?;
        *self.challenge.write().await = Some(challenge);
        debug!("New challenge {}", hex::encode(challenge));
        Ok(())
    }

    /// Every node with an active order, marked unproven
    pub async fn get_challenge_nodes(&self) -> Result<HashMap<NodeId, bool>> {
        let orders = self.db.list_active_orders(self.clock.now()).await?;
        Ok(orders
            .iter()
            .map(|order| (NodeId::new(order.address, order.nid), false))
            .collect())
    }

    /// Collect results into `nodes` for one prove window.
    ///
    /// Results for nodes outside the map are dropped. Results queued before
    /// the window opens, from the wait phase or an earlier cycle, are read
    /// first and credited to this window. Returns early with what was
    /// collected when `shutdown` fires.
    pub async fn handle_result(
        &self,
        mut nodes: HashMap<NodeId, bool>,
        shutdown: &CancellationToken,
    ) -> HashMap<NodeId, bool> {
        let mut results = self.results.lock().await;
        let deadline = tokio::time::sleep(self.intervals.prove());
        tokio::pin!(deadline);
        let mut open = true;

        debug!("Collecting results for {} nodes", nodes.len());
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = shutdown.cancelled() => break,
                received = results.recv(), if open => match received {
                    Some(result) => match nodes.get_mut(&result.node) {
                        Some(proven) => *proven = result.success,
                        None => debug!("Ignoring result for unchallenged node {}", result.node),
                    },
                    None => {
                        warn!("Result queue closed");
                        open = false;
                    }
                },
            }
        }

        let proven = nodes.values().filter(|proven| **proven).count();
        info!("Prove window closed: {}/{} nodes proven", proven, nodes.len());
        nodes
    }

    /// Settle every node against its provider's profit row, in node order.
    /// Stops at the first store failure.
    pub async fn add_penalty(&self, results: &HashMap<NodeId, bool>) -> Result<()> {
        let anchor = self.last_anchor();
        let mut nodes: Vec<_> = results.iter().collect();
        nodes.sort_by_key(|(node, _)| **node);

        for (node, proven) in nodes {
            let (profit, outcome) = self
                .db
                .update_profit(&node.provider, |profit| settle(anchor, *proven, profit))
                .await?;

            info!(
                "Settled {} (proven: {}): reward {}, penalty {}, balance {}",
                node, proven, outcome.reward, outcome.penalty, profit.balance
            );
        }
        Ok(())
    }

    /// Sign a withdrawal of `amount` for `address` at its current nonce
    pub async fn generate_withdraw_signature(
        &self,
        address: &Address,
        amount: &BigUint,
    ) -> Result<[u8; signature::SIGNATURE_LENGTH]> {
        let profit = self.db.get_profit(address).await?;
        let digest = signature::withdraw_digest(address, amount, profit.nonce);
        signature::sign_digest(&self.secp, &self.secret_key, digest)
    }
}

/// Sleep unless cancelled first; false on cancellation
async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Running scheduler task
pub struct SchedulerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the loop and wait until it has exited
    pub async fn stop(self) -> Result<()> {
        self.token.cancel();
        self.join
            .await
            .map_err(|e| ValidatorError::Task(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManualClock;
    use crate::database::{Order, Profit};
    use crate::storage::MemoryStorage;
    use num_bigint::BigInt;

    fn key() -> SecretKey {
        SecretKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn validator(clock: Arc<ManualClock>) -> (GridValidator, ResultSender, Database) {
        let db = Database::new(Arc::new(MemoryStorage::new()));
        let (sender, rx) = result_channel(DEFAULT_RESULT_QUEUE_CAPACITY);
        let validator = GridValidator::new(db.clone(), key(), Intervals::default(), rx)
            .with_clock(clock);
        (validator, sender, db)
    }

    #[tokio::test]
    async fn test_challenge_nodes_come_from_active_orders() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (validator, _sender, db) = validator(clock);
        let user = Some(Address::repeat_byte(9));
        let cp = Address::repeat_byte(1);

        db.create_order(&Order::new(cp, 1, 4, user, 900, 0, 500)).await.unwrap();
        db.create_order(&Order::new(cp, 2, 5, user, 2_000, 0, 500)).await.unwrap();

        let nodes = validator.get_challenge_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes.get(&NodeId::new(cp, 4)), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_result_ignores_unknown_nodes() {
        let (validator, sender, _db) = validator(Arc::new(ManualClock::new(0)));
        let known = NodeId::new(Address::repeat_byte(1), 1);
        let stranger = NodeId::new(Address::repeat_byte(2), 1);

        sender.submit(ProofResult::new(stranger, true)).await.unwrap();
        sender.submit(ProofResult::new(known, true)).await.unwrap();

        let nodes = HashMap::from([(known, false)]);
        let results = validator
            .handle_result(nodes, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[&known], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_result_overwrites() {
        let (validator, sender, _db) = validator(Arc::new(ManualClock::new(0)));
        let node = NodeId::new(Address::repeat_byte(1), 1);

        sender.submit(ProofResult::new(node, true)).await.unwrap();
        sender.submit(ProofResult::new(node, false)).await.unwrap();

        let results = validator
            .handle_result(HashMap::from([(node, false)]), &CancellationToken::new())
            .await;
        assert_eq!(results[&node], false);
    }

    #[tokio::test]
    async fn test_add_penalty_updates_each_provider() {
        let (validator, _sender, db) = validator(Arc::new(ManualClock::new(0)));
        validator.last.store(5_000, Ordering::SeqCst);

        let good = Address::repeat_byte(1);
        let bad = Address::repeat_byte(2);
        for address in [good, bad] {
            let mut profit = Profit::empty(address, 1_000);
            profit.end_time = 100_000;
            profit.profit = BigInt::from(10_000);
            db.create_profit(&profit).await.unwrap();
        }

        let results = HashMap::from([
            (NodeId::new(good, 0), true),
            (NodeId::new(bad, 0), false),
        ]);
        validator.add_penalty(&results).await.unwrap();

        let good = db.get_profit(&good).await.unwrap();
        assert_eq!(good.penalty, BigInt::from(0));
        assert_eq!(good.last_time, 5_000);

        let bad = db.get_profit(&bad).await.unwrap();
        assert_eq!(bad.penalty, BigInt::from(100));
        assert_eq!(bad.profit, BigInt::from(9_900));
    }

    #[tokio::test]
    async fn test_add_penalty_requires_profit_row() {
        let (validator, _sender, _db) = validator(Arc::new(ManualClock::new(0)));
        let results = HashMap::from([(NodeId::new(Address::repeat_byte(3), 0), false)]);
        assert!(matches!(
            validator.add_penalty(&results).await,
            Err(ValidatorError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_signature_needs_profit() {
        let (validator, _sender, db) = validator(Arc::new(ManualClock::new(0)));
        let address = Address::repeat_byte(4);
        let amount = BigUint::from(77u8);

        assert!(validator
            .generate_withdraw_signature(&address, &amount)
            .await
            .is_err());

        db.create_profit(&Profit::empty(address, 0)).await.unwrap();
        let sig = validator
            .generate_withdraw_signature(&address, &amount)
            .await
            .unwrap();
        assert_eq!(sig.len(), 65);
        assert!(sig[64] <= 1);
    }

    #[test]
    fn test_status_follows_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let (validator, _sender, _db) = validator(clock.clone());
        assert_eq!(validator.phase(), Phase::Prepare);

        clock.set(12);
        assert_eq!(validator.phase(), Phase::Prove);
        assert!(validator.is_prove_time());

        clock.set(50);
        assert_eq!(validator.phase(), Phase::Wait);
        assert_eq!(validator.cycle_length(), Duration::from_secs(120));
    }
}
