//! mintgate - On-chain payment and inventory allocation for a
//! finite-supply collectible drop.
//!
//! A buyer asks for a quantity; the service reserves inventory, issues a
//! unique payment amount to a fixed address, watches the ledger for a
//! matching output, and assigns concrete items once it confirms.
//!
//! # Modules
//!
//! - [`amount`] - Fixed-point 8-decimal amounts
//! - [`config`] - Application configuration
//! - [`store`] - Single-writer SQLite persistence
//! - [`rpc`] - Quota-aware RPC pool and typed ledger client
//! - [`engine`] - Reservation & correlation engine
//! - [`observer`] - Block and mempool scanners
//! - [`sweeper`] - Stale session expiry
//! - [`gateway`] - Public HTTP API

pub mod amount;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod logging;
pub mod observer;
pub mod rpc;
pub mod store;
pub mod sweeper;

// Convenient re-exports at crate root
pub use amount::Amount;
pub use config::AppConfig;
pub use engine::{EngineError, PaymentIntent, ReservationEngine, MAX_SUPPLY};
pub use observer::{BlockScanner, Cadence, MempoolScanner};
pub use rpc::{LedgerClient, LedgerRpc, RpcPool};
pub use store::{MintProgress, Session, SessionStatus, Store};
pub use sweeper::Sweeper;
