//! Slot game core
//!
//! Symbol table, weighted drawer, board and win evaluation. Everything here is
//! pure and synchronous; money movement lives in `ledger` and `order`.

pub mod board;
pub mod drawer;
pub mod evaluator;
pub mod symbol;

pub use board::{Board, Line};
pub use drawer::{SymbolDraw, WeightedDrawer};
pub use evaluator::{Evaluation, ScatterRule, WinEvaluator, WinKind, WinningLine};
pub use symbol::{PaytableError, Symbol, SymbolEntry, SymbolTable};
