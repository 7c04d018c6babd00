mod common;

use common::TokioClock;
use ethers::types::Address;
use grid_validator::common::ManualClock;
use grid_validator::database::{Order, Profit};
use grid_validator::storage::MemoryStorage;
use grid_validator::validator::{signature, Intervals};
use grid_validator::{result_channel, Database, GridValidator, NodeId, ProofResult, ResultSender};
use num_bigint::{BigInt, BigUint};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BASE: i64 = 1_000_000;

fn secret_key() -> SecretKey {
    SecretKey::from_slice(&[0x5a; 32]).unwrap()
}

fn setup() -> (GridValidator, ResultSender, Database) {
    let db = Database::new(Arc::new(MemoryStorage::new()));
    let (sender, receiver) = result_channel(16);
    let validator = GridValidator::new(db.clone(), secret_key(), Intervals::default(), receiver);
    (validator, sender, db)
}

async fn seed_provider(db: &Database, provider: Address, nodes: &[u64]) {
    let mut profit = Profit::empty(provider, BASE - 1_000);
    profit.end_time = BASE + 100_000;
    profit.profit = BigInt::from(10_000);
    db.create_profit(&profit).await.unwrap();

    for nid in nodes {
        let order = Order::new(
            provider,
            *nid,
            *nid,
            Some(Address::repeat_byte(0xee)),
            BASE - 100,
            0,
            10_000,
        );
        db.create_order(&order).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_nodes_stay_unproven() {
    let (validator, sender, db) = setup();
    let validator = validator.with_clock(Arc::new(ManualClock::new(BASE)));

    let a = Address::repeat_byte(1);
    let b = Address::repeat_byte(2);
    seed_provider(&db, a, &[0, 1]).await;
    seed_provider(&db, b, &[0]).await;

    let nodes = validator.get_challenge_nodes().await.unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.values().all(|proven| !proven));

    sender.submit(ProofResult::new(NodeId::new(a, 0), true)).await.unwrap();
    sender.submit(ProofResult::new(NodeId::new(b, 0), true)).await.unwrap();

    let started = tokio::time::Instant::now();
    let results = validator
        .handle_result(nodes, &CancellationToken::new())
        .await;

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(results.len(), 3);
    assert_eq!(results[&NodeId::new(a, 0)], true);
    assert_eq!(results[&NodeId::new(b, 0)], true);
    assert_eq!(results[&NodeId::new(a, 1)], false);
}

#[tokio::test(start_paused = true)]
async fn test_results_queued_before_window_are_credited() {
    let (validator, sender, _db) = setup();
    let early = NodeId::new(Address::repeat_byte(1), 0);
    let late = NodeId::new(Address::repeat_byte(2), 0);

    // sent during the wait phase, before any window is open
    sender.submit(ProofResult::new(early, true)).await.unwrap();

    let results = validator
        .handle_result(HashMap::from([(early, false)]), &CancellationToken::new())
        .await;
    assert_eq!(results[&early], true);

    // a result for a node outside the window is consumed and dropped
    sender.submit(ProofResult::new(late, true)).await.unwrap();
    let results = validator
        .handle_result(HashMap::from([(early, false)]), &CancellationToken::new())
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[&early], false);
}

#[tokio::test(start_paused = true)]
async fn test_collection_stops_on_cancel() {
    let (validator, _sender, _db) = setup();
    let node = NodeId::new(Address::repeat_byte(1), 0);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            token.cancel();
        })
    };

    let started = tokio::time::Instant::now();
    let results = validator
        .handle_result(HashMap::from([(node, false)]), &token)
        .await;

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(results[&node], false);
    canceller.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cycle_settles_challenged_providers() {
    let (validator, sender, db) = setup();
    let validator = Arc::new(validator.with_clock(Arc::new(TokioClock::new(BASE))));

    let proven = Address::repeat_byte(1);
    let silent = Address::repeat_byte(2);
    seed_provider(&db, proven, &[0]).await;
    seed_provider(&db, silent, &[0]).await;
    sender
        .submit(ProofResult::new(NodeId::new(proven, 0), true))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = validator.start(&shutdown);

    // 80s to the next prepare phase, 10s to prove, 10s collecting
    tokio::time::sleep(Duration::from_secs(105)).await;

    let settled = db.get_profit(&proven).await.unwrap();
    assert_eq!(settled.last_time, BASE + 80);
    assert_eq!(settled.penalty, BigInt::from(0));
    assert_eq!(settled.profit, BigInt::from(10_000));

    let penalised = db.get_profit(&silent).await.unwrap();
    assert_eq!(penalised.last_time, BASE + 80);
    assert_eq!(penalised.penalty, BigInt::from(100));
    assert_eq!(penalised.profit, BigInt::from(9_900));

    assert_eq!(validator.last_anchor(), BASE + 80);
    assert!(validator.current_challenge().await.is_some());

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_loop_exit() {
    let (validator, _sender, _db) = setup();
    let validator = Arc::new(validator.with_clock(Arc::new(TokioClock::new(BASE))));

    let handle = validator.start(&CancellationToken::new());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!handle.is_finished());

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_scheduler() {
    let (validator, _sender, _db) = setup();
    let validator = Arc::new(validator.with_clock(Arc::new(TokioClock::new(BASE))));

    let parent = CancellationToken::new();
    let handle = validator.start(&parent);
    parent.cancel();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(handle.is_finished());
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_withdraw_signature_recovers_validator() {
    let (validator, _sender, db) = setup();
    let provider = Address::repeat_byte(7);
    db.create_profit(&Profit::empty(provider, 0)).await.unwrap();
    db.update_profit(&provider, |p| p.nonce = 3).await.unwrap();

    let amount = BigUint::from(123_456_789u64);
    let sig = validator
        .generate_withdraw_signature(&provider, &amount)
        .await
        .unwrap();

    let secp = Secp256k1::new();
    let digest = signature::withdraw_digest(&provider, &amount, 3);
    let recoverable =
        RecoverableSignature::from_compact(&sig[..64], RecoveryId::from_i32(sig[64] as i32).unwrap())
            .unwrap();
    let public = secp
        .recover_ecdsa(&Message::from_digest(digest), &recoverable)
        .unwrap();

    assert_eq!(public, secp256k1::PublicKey::from_secret_key(&secp, &secret_key()));
    assert_eq!(validator.address(), signature::address_of(&secp, &secret_key()));
}

#[tokio::test]
async fn test_withdraw_signature_without_profit_fails() {
    let (validator, _sender, _db) = setup();
    assert!(validator
        .generate_withdraw_signature(&Address::repeat_byte(8), &BigUint::from(1u8))
        .await
        .is_err());
}
