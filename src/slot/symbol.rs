//! Symbol catalog
//!
//! The symbol set is closed (10 variants). Weights and payouts live in an
//! immutable `SymbolTable` that is built once at startup and shared via `Arc`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::money::STORAGE_SCALE;

/// Slot symbol
///
/// `repr(u8)` ids are stable and index directly into `SymbolTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Symbol {
    Cherry = 0,
    Lemon = 1,
    Orange = 2,
    Plum = 3,
    Bell = 4,
    Grape = 5,
    Watermelon = 6,
    Bar = 7,
    Seven = 8,
    Diamond = 9,
}

impl Symbol {
    /// All variants in id order
    pub const ALL: [Symbol; 10] = [
        Symbol::Cherry,
        Symbol::Lemon,
        Symbol::Orange,
        Symbol::Plum,
        Symbol::Bell,
        Symbol::Grape,
        Symbol::Watermelon,
        Symbol::Bar,
        Symbol::Seven,
        Symbol::Diamond,
    ];

    #[inline]
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Cherry => "CHERRY",
            Symbol::Lemon => "LEMON",
            Symbol::Orange => "ORANGE",
            Symbol::Plum => "PLUM",
            Symbol::Bell => "BELL",
            Symbol::Grape => "GRAPE",
            Symbol::Watermelon => "WATERMELON",
            Symbol::Bar => "BAR",
            Symbol::Seven => "SEVEN",
            Symbol::Diamond => "DIAMOND",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Paytable construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaytableError {
    #[error("Symbol missing from paytable: {0}")]
    MissingSymbol(Symbol),

    #[error("Symbol listed more than once: {0}")]
    DuplicateSymbol(Symbol),

    #[error("Weight must be positive for {0}")]
    ZeroWeight(Symbol),

    #[error("Payout must not be negative for {0}")]
    NegativePayout(Symbol),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Payout for {symbol} has {scale} decimals, max {max} at this money scale")]
    PayoutScale { symbol: Symbol, scale: u32, max: u32 },

    #[error("Money scale {scale} exceeds storage scale {max}")]
    MoneyScale { scale: u32, max: u32 },
}

/// One paytable row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: Symbol,
    /// Relative draw probability mass
    pub weight: u32,
    /// Multiplier applied to the bet per winning line
    pub payout: Decimal,
}

impl SymbolEntry {
    pub fn new(symbol: Symbol, weight: u32, payout: Decimal) -> Self {
        Self {
            symbol,
            weight,
            payout,
        }
    }
}

/// Immutable symbol catalog
///
/// # Invariants:
/// - Exactly one entry per `Symbol` variant, stored at index `symbol.id()`
/// - Every weight > 0, every payout >= 0
#[derive(Debug, Clone)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    total_weight: u64,
}

impl SymbolTable {
    /// Build a table, failing fast on any missing, duplicated or invalid row.
    pub fn new(rows: Vec<SymbolEntry>) -> Result<Self, PaytableError> {
        let mut slots: [Option<SymbolEntry>; 10] = [None; 10];

        for row in rows {
            if row.weight == 0 {
                return Err(PaytableError::ZeroWeight(row.symbol));
            }
            if row.payout.is_sign_negative() && !row.payout.is_zero() {
                return Err(PaytableError::NegativePayout(row.symbol));
            }
            let slot = &mut slots[row.symbol.id() as usize];
            if slot.is_some() {
                return Err(PaytableError::DuplicateSymbol(row.symbol));
            }
            *slot = Some(row);
        }

        let mut entries = Vec::with_capacity(Symbol::ALL.len());
        for symbol in Symbol::ALL {
            let entry = slots[symbol.id() as usize].ok_or(PaytableError::MissingSymbol(symbol))?;
            entries.push(entry);
        }

        let total_weight = entries.iter().map(|e| e.weight as u64).sum();
        Ok(Self {
            entries,
            total_weight,
        })
    }

    /// Built-in paytable used when the config has none
    pub fn standard() -> Self {
        let rows = vec![
            SymbolEntry::new(Symbol::Cherry, 25, Decimal::new(10, 1)),
            SymbolEntry::new(Symbol::Lemon, 20, Decimal::new(15, 1)),
            SymbolEntry::new(Symbol::Orange, 15, Decimal::new(20, 1)),
            SymbolEntry::new(Symbol::Plum, 12, Decimal::new(30, 1)),
            SymbolEntry::new(Symbol::Bell, 8, Decimal::new(50, 1)),
            SymbolEntry::new(Symbol::Grape, 7, Decimal::new(80, 1)),
            SymbolEntry::new(Symbol::Watermelon, 5, Decimal::new(100, 1)),
            SymbolEntry::new(Symbol::Bar, 4, Decimal::new(200, 1)),
            SymbolEntry::new(Symbol::Seven, 3, Decimal::new(500, 1)),
            SymbolEntry::new(Symbol::Diamond, 1, Decimal::new(1000, 1)),
        ];
        // Static rows cover every variant with positive weights
        match Self::new(rows) {
            Ok(table) => table,
            Err(e) => unreachable!("standard paytable is invalid: {}", e),
        }
    }

    /// Entries in `Symbol` id order
    #[inline]
    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    #[inline]
    pub fn entry(&self, symbol: Symbol) -> &SymbolEntry {
        &self.entries[symbol.id() as usize]
    }

    #[inline]
    pub fn weight(&self, symbol: Symbol) -> u32 {
        self.entry(symbol).weight
    }

    #[inline]
    pub fn payout(&self, symbol: Symbol) -> Decimal {
        self.entry(symbol).payout
    }

    #[inline]
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Check that every `payout x bet` stays within the storage scale.
    ///
    /// A bet carries at most `money_scale` decimals, so a win carries at most
    /// `payout scale + money_scale`.
    pub fn check_money_scale(&self, money_scale: u32) -> Result<(), PaytableError> {
        if money_scale > STORAGE_SCALE {
            return Err(PaytableError::MoneyScale {
                scale: money_scale,
                max: STORAGE_SCALE,
            });
        }
        let max = STORAGE_SCALE - money_scale;
        for entry in &self.entries {
            let scale = entry.payout.normalize().scale();
            if scale > max {
                return Err(PaytableError::PayoutScale {
                    symbol: entry.symbol,
                    scale,
                    max,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<SymbolEntry> {
        SymbolTable::standard().entries().to_vec()
    }

    #[test]
    fn test_standard_table_covers_all_symbols() {
        let table = SymbolTable::standard();
        assert_eq!(table.entries().len(), 10);
        for (i, entry) in table.entries().iter().enumerate() {
            assert_eq!(entry.symbol.id() as usize, i);
        }
        assert_eq!(table.total_weight(), 100);
        assert_eq!(table.payout(Symbol::Bell), Decimal::new(5, 0));
    }

    #[test]
    fn test_missing_symbol_rejected() {
        let mut rows = rows();
        rows.retain(|e| e.symbol != Symbol::Seven);
        assert_eq!(
            SymbolTable::new(rows).unwrap_err(),
            PaytableError::MissingSymbol(Symbol::Seven)
        );
    }

    #[test]
    fn test_zero_weight_rejected() {
        let mut rows = rows();
        rows[3].weight = 0;
        assert_eq!(
            SymbolTable::new(rows).unwrap_err(),
            PaytableError::ZeroWeight(Symbol::Plum)
        );
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut rows = rows();
        rows.push(SymbolEntry::new(Symbol::Bar, 1, Decimal::ONE));
        assert_eq!(
            SymbolTable::new(rows).unwrap_err(),
            PaytableError::DuplicateSymbol(Symbol::Bar)
        );
    }

    #[test]
    fn test_negative_payout_rejected() {
        let mut rows = rows();
        rows[0].payout = Decimal::new(-1, 0);
        assert_eq!(
            SymbolTable::new(rows).unwrap_err(),
            PaytableError::NegativePayout(Symbol::Cherry)
        );
    }

    #[test]
    fn test_payout_scale_bounded_by_money_scale() {
        let table = SymbolTable::standard();
        assert!(table.check_money_scale(2).is_ok());
        assert!(table.check_money_scale(7).is_ok());
        assert_eq!(
            table.check_money_scale(9).unwrap_err(),
            PaytableError::MoneyScale { scale: 9, max: 8 }
        );

        let mut fine_bell = rows();
        fine_bell[4].payout = "1.123456789".parse().unwrap();
        let table = SymbolTable::new(fine_bell).unwrap();
        assert_eq!(
            table.check_money_scale(2).unwrap_err(),
            PaytableError::PayoutScale {
                symbol: Symbol::Bell,
                scale: 9,
                max: 6
            }
        );

        // Trailing zeros do not count
        let mut padded = rows();
        padded[0].payout = "2.500000000".parse().unwrap();
        assert!(SymbolTable::new(padded).unwrap().check_money_scale(2).is_ok());
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let mut rows = rows();
        rows.reverse();
        let table = SymbolTable::new(rows).unwrap();
        assert_eq!(table.entry(Symbol::Cherry).symbol, Symbol::Cherry);
        assert_eq!(table.weight(Symbol::Diamond), 1);
    }

    #[test]
    fn test_symbol_id_roundtrip_and_serde_name() {
        for symbol in Symbol::ALL {
            assert_eq!(Symbol::from_id(symbol.id()), Some(symbol));
        }
        assert_eq!(Symbol::from_id(10), None);
        assert_eq!(serde_json::to_string(&Symbol::Watermelon).unwrap(), "\"WATERMELON\"");
    }
}
