//! Typed Ledger Client
//!
//! Thin, typed wrappers over the RPC pool for the handful of node methods
//! the observers use. Every accessor returns `Option`: `None` covers both
//! upstream failure and exhausted capacity, and the observer responds the
//! same way to either (skip the cycle).

use super::pool::{PoolCapacity, RpcPool};
use crate::amount::Amount;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Per-call quota unit costs. Chosen so `remaining / RAW_TRANSACTION` is
/// "verbose transaction fetches still affordable today".
pub mod cost {
    pub const GET_BLOCK_COUNT: u64 = 1;
    pub const GET_BLOCK_HASH: u64 = 1;
    pub const GET_BLOCK: u64 = 50;
    pub const GET_RAW_MEMPOOL: u64 = 10;
    pub const GET_RAW_TRANSACTION: u64 = 20;
}

/// A block at verbosity 2: full transactions inline.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub hash: String,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub tx: Vec<RawTransaction>,
}

/// A decoded transaction (from a verbose block or `getrawtransaction`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOut {
    pub value: Decimal,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

/// Recipient descriptor. Older nodes report an `addresses` array, newer
/// ones a single `address`; both count.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl TxOut {
    pub fn pays_to(&self, address: &str) -> bool {
        self.script_pub_key.address.as_deref() == Some(address)
            || self.script_pub_key.addresses.iter().any(|a| a == address)
    }

    /// Output amount in base units, when it is representable at 8 decimals.
    pub fn amount(&self) -> Option<Amount> {
        Amount::from_decimal(self.value)
    }
}

/// The ledger surface the observers poll. Mocked in tests.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn tip_height(&self) -> Option<u64>;
    async fn block_hash(&self, height: u64) -> Option<String>;
    async fn block(&self, hash: &str) -> Option<Block>;
    async fn raw_mempool(&self) -> Option<Vec<String>>;
    async fn raw_transaction(&self, txid: &str) -> Option<RawTransaction>;
    async fn capacity(&self) -> PoolCapacity;
}

/// Production implementation over the quota-aware pool.
pub struct LedgerClient {
    pool: Arc<RpcPool>,
}

impl LedgerClient {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        Self { pool }
    }

    async fn typed_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
        cost: u64,
    ) -> Option<T> {
        let raw = self.pool.call(method, params, cost).await?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(method, error = %e, "undecodable rpc result");
                None
            }
        }
    }
}

#[async_trait]
impl LedgerRpc for LedgerClient {
    async fn tip_height(&self) -> Option<u64> {
        self.typed_call("getblockcount", json!([]), cost::GET_BLOCK_COUNT)
            .await
    }

    async fn block_hash(&self, height: u64) -> Option<String> {
        self.typed_call("getblockhash", json!([height]), cost::GET_BLOCK_HASH)
            .await
    }

    async fn block(&self, hash: &str) -> Option<Block> {
        self.typed_call("getblock", json!([hash, 2]), cost::GET_BLOCK)
            .await
    }

    async fn raw_mempool(&self) -> Option<Vec<String>> {
        self.typed_call("getrawmempool", json!([]), cost::GET_RAW_MEMPOOL)
            .await
    }

    async fn raw_transaction(&self, txid: &str) -> Option<RawTransaction> {
        self.typed_call(
            "getrawtransaction",
            json!([txid, 1]),
            cost::GET_RAW_TRANSACTION,
        )
        .await
    }

    async fn capacity(&self) -> PoolCapacity {
        self.pool.capacity().await
    }
}
