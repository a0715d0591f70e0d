//! Upstream RPC Module
//!
//! Two layers: [`pool`] routes raw JSON-RPC calls across rate-limited
//! providers with quota accounting and failover; [`ledger`] puts a typed,
//! mockable surface over it for the observers.

pub mod ledger;
pub mod pool;

pub use ledger::{cost, Block, LedgerClient, LedgerRpc, RawTransaction, ScriptPubKey, TxOut};
pub use pool::{EndpointConfig, HttpTransport, PoolCapacity, RpcError, RpcPool, RpcTransport};
