//! Slot Settlement - Round Settlement Engine
//!
//! Settles rounds of a 3x3 weighted-symbol slot game against a player's
//! ledger with a full audit trail.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases
//! - [`money`] - Decimal amount parsing and validation
//! - [`slot`] - Symbol table, weighted drawer, board and win evaluator
//! - [`ledger`] - Balance mutations and balance records
//! - [`order`] - Order lifecycle and the settlement engine
//! - [`store`] - Transactional storage (PostgreSQL and in-memory)
//! - [`config`] / [`logging`] / [`db`] - Process setup
//!
//! ```text
//! OrderEngine ─▶ WeightedDrawer ─▶ Board ─▶ WinEvaluator
//!      │
//!      └──────▶ Ledger ─▶ StoreTx (one transaction per round)
//! ```

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod order;
pub mod slot;
pub mod store;

// Convenient re-exports at crate root
pub use config::{AppConfig, EngineConfig};
pub use core_types::{BalanceRecordId, OrderId, UserId};
pub use error::SettleError;
pub use ledger::{BalanceChange, BalanceKind, BalanceRecord, Ledger, UserAccount};
pub use order::{AuditReport, GameResult, Order, OrderEngine, OrderStatus, OrderType, SettleRequest};
pub use slot::{Board, Symbol, SymbolTable, WeightedDrawer, WinEvaluator};
pub use store::{MemoryStore, PgSettlementStore, SettlementStore, StoreError};
