//! Weighted symbol drawer
//!
//! `P(symbol) = weight(symbol) / total_weight`. Entropy comes from the OS
//! CSPRNG on every draw; nothing is seeded and no state survives a draw.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::OsRng;
use std::sync::Arc;

use super::symbol::{PaytableError, Symbol, SymbolTable};

/// Source of board cells
///
/// Shared by every concurrent round, so implementations must be `Send + Sync`.
pub trait SymbolDraw: Send + Sync {
    fn draw(&self) -> Symbol;
}

/// Production drawer backed by `OsRng`
pub struct WeightedDrawer {
    table: Arc<SymbolTable>,
    index: WeightedIndex<u64>,
}

impl WeightedDrawer {
    pub fn new(table: Arc<SymbolTable>) -> Result<Self, PaytableError> {
        // u32 weights can sum past u32::MAX
        let index = WeightedIndex::new(table.entries().iter().map(|e| e.weight as u64))
            .map_err(|e| PaytableError::InvalidWeights(e.to_string()))?;
        Ok(Self { table, index })
    }

    pub fn table(&self) -> &Arc<SymbolTable> {
        &self.table
    }
}

impl SymbolDraw for WeightedDrawer {
    fn draw(&self) -> Symbol {
        let i = self.index.sample(&mut OsRng);
        self.table.entries()[i].symbol
    }
}
