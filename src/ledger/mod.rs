//! Ledger
//!
//! Subsystem of record for player balances. Balance kinds:
//!
//! | kind     | available | frozen  |
//! |----------|-----------|---------|
//! | ADD      | +amount   | 0       |
//! | DEDUCT   | -amount   | 0       |
//! | FREEZE   | -amount   | +amount |
//! | UNFREEZE | +amount   | -amount |
//!
//! Every applied change writes exactly one append-only `BalanceRecord`.

pub mod service;
pub mod types;

pub use service::{Ledger, before_balance_change};
pub use types::{BalanceChange, BalanceKind, BalanceRecord, UserAccount};
