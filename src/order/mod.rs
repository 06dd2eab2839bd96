//! Slot Order Settlement
//!
//! One order per round. The engine owns the transaction boundary:
//! ledger changes, the game result and the order row commit together or not
//! at all.
//!
//! # State Machine
//!
//! ```text
//! PENDING → COMPLETED
//!         → CANCELLED
//!         → FAILED
//! ```
//!
//! PENDING only exists inside the settlement transaction. Committed orders are
//! always terminal.

pub mod engine;
pub mod id;
pub mod state;
pub mod types;

pub use engine::{AuditReport, OrderEngine, before_order_create};
pub use id::{SnowflakeGenerator, order_number};
pub use state::{OrderStatus, OrderType};
pub use types::{GameResult, Order, SettleRequest};
