//! End-to-end drop scenarios: intent -> on-chain payment -> assignment,
//! driven through the public crate surface with a scripted mock ledger.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mintgate::amount::Amount;
use mintgate::engine::{EngineError, ReservationEngine, MAX_SUPPLY};
use mintgate::observer::{BlockScanner, Cadence, MempoolScanner};
use mintgate::rpc::{Block, LedgerRpc, PoolCapacity, RawTransaction};
use mintgate::store::{SessionStatus, Store};
use mintgate::sweeper::Sweeper;

const DROP_ADDRESS: &str = "bc1qdropwallet";

/// Scripted chain + mempool.
#[derive(Default)]
struct MockLedger {
    tip: Mutex<u64>,
    blocks: Mutex<HashMap<u64, Block>>,
    mempool: Mutex<Vec<String>>,
    transactions: Mutex<HashMap<String, RawTransaction>>,
}

impl MockLedger {
    fn payment_tx(txid: &str, address: &str, amount: Amount) -> RawTransaction {
        serde_json::from_value(json!({
            "txid": txid,
            "vout": [{
                "value": amount.to_decimal(),
                "scriptPubKey": {"addresses": [address]}
            }]
        }))
        .unwrap()
    }

    /// Append a block paying `amount` to the drop address.
    fn confirm_payment(&self, txid: &str, amount: Amount) {
        let mut tip = self.tip.lock().unwrap();
        *tip += 1;
        let height = *tip;
        let block = Block {
            hash: format!("hash-{height}"),
            height,
            tx: vec![Self::payment_tx(txid, DROP_ADDRESS, amount)],
        };
        self.blocks.lock().unwrap().insert(height, block);
        // A confirmed transaction leaves the mempool.
        self.mempool.lock().unwrap().retain(|t| t != txid);
    }

    fn broadcast(&self, txid: &str, amount: Amount) {
        self.mempool.lock().unwrap().push(txid.to_string());
        self.transactions
            .lock()
            .unwrap()
            .insert(txid.to_string(), Self::payment_tx(txid, DROP_ADDRESS, amount));
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn tip_height(&self) -> Option<u64> {
        Some(*self.tip.lock().unwrap())
    }

    async fn block_hash(&self, height: u64) -> Option<String> {
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .map(|b| b.hash.clone())
    }

    async fn block(&self, hash: &str) -> Option<Block> {
        self.blocks
            .lock()
            .unwrap()
            .values()
            .find(|b| b.hash == hash)
            .cloned()
    }

    async fn raw_mempool(&self) -> Option<Vec<String>> {
        Some(self.mempool.lock().unwrap().clone())
    }

    async fn raw_transaction(&self, txid: &str) -> Option<RawTransaction> {
        self.transactions.lock().unwrap().get(txid).cloned()
    }

    async fn capacity(&self) -> PoolCapacity {
        PoolCapacity {
            remaining: 250_000,
            daily_total: 250_000,
            enabled: 5,
        }
    }
}

struct Fixture {
    store: Arc<Store>,
    engine: Arc<ReservationEngine>,
    ledger: Arc<MockLedger>,
}

impl Fixture {
    async fn with_items(count: usize) -> Self {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store.init_schema().await.unwrap();
        let refs: Vec<String> = (1..=count).map(|i| format!("cid-{i:04}")).collect();
        store.seed_items(&refs).await.unwrap();
        let engine = Arc::new(ReservationEngine::new(
            store.clone(),
            Amount::from_units(500_000),
            DROP_ADDRESS.to_string(),
        ));
        Self {
            store,
            engine,
            ledger: Arc::new(MockLedger::default()),
        }
    }

    fn block_scanner(&self) -> BlockScanner {
        BlockScanner::new(
            self.store.clone(),
            self.engine.clone(),
            self.ledger.clone() as Arc<dyn LedgerRpc>,
            DROP_ADDRESS.to_string(),
        )
    }

    fn mempool_scanner(&self) -> MempoolScanner {
        MempoolScanner::new(
            self.store.clone(),
            self.engine.clone(),
            self.ledger.clone() as Arc<dyn LedgerRpc>,
            DROP_ADDRESS.to_string(),
            Arc::new(Cadence::new()),
        )
    }
}

#[tokio::test]
async fn happy_path_single_item() {
    let fx = Fixture::with_items(1).await;

    let intent = fx.engine.create_intent(1).await.unwrap();
    assert_eq!(intent.amount_due.to_string(), "0.00500001");
    assert_eq!(intent.address, DROP_ADDRESS);

    fx.ledger.confirm_payment("tx-happy", intent.amount_due);
    fx.block_scanner().scan_once().await.unwrap();

    let session = fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.txid.as_deref(), Some("tx-happy"));
    let refs = session.assigned_refs.unwrap();
    assert_eq!(refs, vec!["cid-0001".to_string()]);

    let progress = fx.store.progress(MAX_SUPPLY).await.unwrap();
    assert_eq!(progress.minted, 1);
    assert_eq!(progress.available, 0);
}

#[tokio::test]
async fn mempool_detection_then_confirmation() {
    let fx = Fixture::with_items(1).await;
    let intent = fx.engine.create_intent(1).await.unwrap();

    // Unconfirmed broadcast: session flips to payment_pending.
    fx.ledger.broadcast("tx-slow", intent.amount_due);
    fx.mempool_scanner().scan_once().await.unwrap();

    let session = fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::PaymentPending);
    assert_eq!(session.txid.as_deref(), Some("tx-slow"));

    // Inclusion in a block: session completes.
    fx.ledger.confirm_payment("tx-slow", intent.amount_due);
    fx.block_scanner().scan_once().await.unwrap();

    let session = fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.assigned_refs.unwrap().len(), 1);
}

#[tokio::test]
async fn expiry_releases_all_reservations() {
    let fx = Fixture::with_items(10).await;
    let intent = fx.engine.create_intent(5).await.unwrap();

    // Eleven minutes with no payment.
    sqlx::query("UPDATE sessions SET created_at = created_at - 660 WHERE session_id = ?")
        .bind(&intent.session_id)
        .execute(fx.store.pool())
        .await
        .unwrap();

    let sweeper = Sweeper::new(fx.engine.clone());
    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

    assert!(fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .is_none());
    let progress = fx.store.progress(MAX_SUPPLY).await.unwrap();
    assert_eq!(progress.reserved, 0);
    assert_eq!(progress.minted, 0);
    assert_eq!(progress.available, 10);
}

#[tokio::test]
async fn race_on_last_item_has_one_winner() {
    let fx = Fixture::with_items(1).await;

    let first = {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.create_intent(1).await })
    };
    let second = {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.create_intent(1).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(EngineError::InsufficientInventory { .. })
    )));

    // The winner still completes normally.
    let intent = results
        .into_iter()
        .find_map(|r| r.ok())
        .expect("one winner");
    fx.ledger.confirm_payment("tx-race", intent.amount_due);
    fx.block_scanner().scan_once().await.unwrap();
    let session = fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
}

#[tokio::test]
async fn overbooking_is_impossible() {
    let fx = Fixture::with_items(3).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = fx.engine.clone();
        handles.push(tokio::spawn(async move { engine.create_intent(1).await }));
    }

    let mut ok = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::InsufficientInventory { .. }) => failed += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(failed, 7);

    let progress = fx.store.progress(MAX_SUPPLY).await.unwrap();
    assert_eq!(progress.reserved, 3);
    assert_eq!(progress.available, 0);
}

#[tokio::test]
async fn amounts_are_unique_and_consecutive() {
    let fx = Fixture::with_items(1000).await;

    let mut amounts = Vec::with_capacity(1000);
    for _ in 0..1000 {
        let intent = fx.engine.create_intent(1).await.unwrap();
        amounts.push(intent.amount_due.units());
    }

    let mut deduped = amounts.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), 1000);

    for pair in amounts.windows(2) {
        assert_eq!(pair[1] - pair[0], 1);
    }
}

#[tokio::test]
async fn foreign_mempool_traffic_is_ignored() {
    let fx = Fixture::with_items(2).await;
    let intent = fx.engine.create_intent(1).await.unwrap();

    // Same address, wrong amount; wrong address, right amount.
    let off = Amount::from_units(intent.amount_due.units() + 7);
    fx.ledger.broadcast("tx-wrong-amount", off);
    let stray: RawTransaction = serde_json::from_value(json!({
        "txid": "tx-other-wallet",
        "vout": [{
            "value": intent.amount_due.to_decimal(),
            "scriptPubKey": {"addresses": ["bc1qsomeoneelse"]}
        }]
    }))
    .unwrap();
    fx.ledger
        .transactions
        .lock()
        .unwrap()
        .insert("tx-other-wallet".to_string(), stray);
    fx.ledger
        .mempool
        .lock()
        .unwrap()
        .push("tx-other-wallet".to_string());

    fx.mempool_scanner().scan_once().await.unwrap();

    let session = fx
        .store
        .session_by_id(&intent.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
}
