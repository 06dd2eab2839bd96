//! Win evaluation
//!
//! Line wins: any of the 8 canonical lines holding three identical symbols
//! pays `payout x bet`. Scatter wins: a symbol whose board-wide count meets a
//! configured threshold pays `payout x bet` once per threshold met. All wins
//! accumulate; every contribution is computed from the original bet.
//!
//! Arithmetic is checked. A win that overflows or does not fit the money
//! columns is an `AmountOverflow`, never a panic or a rounded value.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::board::{Board, Line};
use super::symbol::{Symbol, SymbolTable};
use crate::error::SettleError;
use crate::money::fits_storage;

/// Kind of a winning pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinKind {
    Row,
    Column,
    Diagonal,
    Scatter,
}

impl fmt::Display for WinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WinKind::Row => "ROW",
            WinKind::Column => "COLUMN",
            WinKind::Diagonal => "DIAGONAL",
            WinKind::Scatter => "SCATTER",
        };
        write!(f, "{}", s)
    }
}

/// One winning pattern
///
/// `position` is the row/column/diagonal index for line wins and the
/// threshold that was met for scatter wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningLine {
    pub kind: WinKind,
    pub position: u8,
    pub symbol: Symbol,
    pub count: u8,
    pub payout: Decimal,
}

/// Scatter tiers
///
/// Thresholds are kept sorted and deduplicated. Empty disables scatter wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScatterRule {
    thresholds: Vec<u8>,
}

impl ScatterRule {
    /// Thresholds outside 1..=9 can never (or always) be met on a 3x3 board
    /// and are dropped.
    pub fn new(thresholds: impl IntoIterator<Item = u8>) -> Self {
        let mut thresholds: Vec<u8> = thresholds
            .into_iter()
            .filter(|t| (1..=9).contains(t))
            .collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self { thresholds }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn thresholds(&self) -> &[u8] {
        &self.thresholds
    }
}

/// Result of evaluating one board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub lines: Vec<WinningLine>,
    pub total_win: Decimal,
}

impl Evaluation {
    pub fn is_win(&self) -> bool {
        self.total_win > Decimal::ZERO
    }
}

pub struct WinEvaluator {
    table: Arc<SymbolTable>,
    scatter: ScatterRule,
}

impl WinEvaluator {
    pub fn new(table: Arc<SymbolTable>, scatter: ScatterRule) -> Self {
        Self { table, scatter }
    }

    pub fn scatter(&self) -> &ScatterRule {
        &self.scatter
    }

    pub fn evaluate(&self, board: &Board, bet_amount: Decimal) -> Result<Evaluation, SettleError> {
        let mut lines = Vec::new();

        for line in Line::ALL {
            let [a, b, c] = board.line(line);
            if a != b || b != c {
                continue;
            }
            let kind = match line {
                Line::Row(_) => WinKind::Row,
                Line::Column(_) => WinKind::Column,
                Line::Diagonal(_) => WinKind::Diagonal,
            };
            lines.push(WinningLine {
                kind,
                position: line.index(),
                symbol: a,
                count: 3,
                payout: self.line_payout(a, bet_amount)?,
            });
        }

        // BTreeMap keeps scatter output in symbol id order
        for (symbol, count) in board.symbol_counts() {
            for &threshold in self.scatter.thresholds() {
                if count < threshold {
                    break;
                }
                lines.push(WinningLine {
                    kind: WinKind::Scatter,
                    position: threshold,
                    symbol,
                    count,
                    payout: self.line_payout(symbol, bet_amount)?,
                });
            }
        }

        let mut total_win = Decimal::ZERO;
        for line in &lines {
            total_win = total_win
                .checked_add(line.payout)
                .ok_or_else(|| overflow(bet_amount))?;
        }
        if !fits_storage(total_win) {
            return Err(overflow(bet_amount));
        }
        Ok(Evaluation { lines, total_win })
    }

    fn line_payout(&self, symbol: Symbol, bet_amount: Decimal) -> Result<Decimal, SettleError> {
        self.table
            .payout(symbol)
            .checked_mul(bet_amount)
            .ok_or_else(|| overflow(bet_amount))
    }
}

fn overflow(bet_amount: Decimal) -> SettleError {
    SettleError::AmountOverflow(format!("win for bet {} does not fit NUMERIC(30,8)", bet_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::symbol::Symbol::*;

    fn evaluator(thresholds: &[u8]) -> WinEvaluator {
        WinEvaluator::new(
            Arc::new(SymbolTable::standard()),
            ScatterRule::new(thresholds.iter().copied()),
        )
    }

    fn bet() -> Decimal {
        Decimal::new(1000, 2)
    }

    #[test]
    fn test_no_win_is_exactly_zero() {
        let board = Board::from_cells([
            [Cherry, Lemon, Orange],
            [Plum, Bell, Grape],
            [Watermelon, Bar, Seven],
        ]);
        let eval = evaluator(&[5]).evaluate(&board, bet()).unwrap();
        assert!(eval.lines.is_empty());
        assert_eq!(eval.total_win, Decimal::ZERO);
        assert!(!eval.is_win());
    }

    #[test]
    fn test_single_row_win() {
        let board = Board::from_cells([
            [Cherry, Lemon, Orange],
            [Bell, Bell, Bell],
            [Watermelon, Bar, Seven],
        ]);
        let eval = evaluator(&[5]).evaluate(&board, bet()).unwrap();
        assert_eq!(eval.lines.len(), 1);
        let line = &eval.lines[0];
        assert_eq!(line.kind, WinKind::Row);
        assert_eq!(line.position, 1);
        assert_eq!(line.symbol, Bell);
        assert_eq!(line.payout, Decimal::new(50, 0));
        assert_eq!(eval.total_win, Decimal::new(5000, 2));
    }

    #[test]
    fn test_column_and_diagonal_wins_accumulate() {
        let board = Board::from_cells([
            [Plum, Cherry, Lemon],
            [Plum, Lemon, Orange],
            [Plum, Bell, Grape],
        ]);
        let eval = evaluator(&[]).evaluate(&board, bet()).unwrap();
        assert_eq!(eval.lines.len(), 1);
        assert_eq!(eval.lines[0].kind, WinKind::Column);

        let board = Board::from_cells([
            [Plum, Cherry, Lemon],
            [Plum, Plum, Orange],
            [Plum, Bell, Plum],
        ]);
        let eval = evaluator(&[]).evaluate(&board, bet()).unwrap();
        let kinds: Vec<_> = eval.lines.iter().map(|l| (l.kind, l.position)).collect();
        assert_eq!(kinds, vec![(WinKind::Column, 0), (WinKind::Diagonal, 0)]);
        // 3.0 x 10 twice
        assert_eq!(eval.total_win, Decimal::new(60, 0));
    }

    #[test]
    fn test_diagonal_win() {
        let board = Board::from_cells([
            [Seven, Cherry, Lemon],
            [Plum, Seven, Orange],
            [Bar, Bell, Seven],
        ]);
        let eval = evaluator(&[]).evaluate(&board, bet()).unwrap();
        assert_eq!(eval.lines.len(), 1);
        assert_eq!(eval.lines[0].kind, WinKind::Diagonal);
        assert_eq!(eval.lines[0].position, 0);
        assert_eq!(eval.total_win, Decimal::new(500, 0));
    }

    #[test]
    fn test_full_board_pays_every_line_and_every_scatter_tier() {
        let board = Board::from_cells([[Cherry; 3]; 3]);
        let eval = evaluator(&[5, 7, 9]).evaluate(&board, bet()).unwrap();
        let line_wins = eval.lines.iter().filter(|l| l.kind != WinKind::Scatter).count();
        let scatter_wins = eval.lines.iter().filter(|l| l.kind == WinKind::Scatter).count();
        assert_eq!(line_wins, 8);
        assert_eq!(scatter_wins, 3);
        // 11 contributions of 1.0 x 10
        assert_eq!(eval.total_win, Decimal::new(110, 0));
    }

    #[test]
    fn test_scatter_independent_of_lines() {
        // 5 Grapes, no line of three
        let board = Board::from_cells([
            [Grape, Grape, Cherry],
            [Grape, Lemon, Grape],
            [Cherry, Grape, Lemon],
        ]);
        let eval = evaluator(&[5, 7]).evaluate(&board, bet()).unwrap();
        assert_eq!(eval.lines.len(), 1);
        let line = &eval.lines[0];
        assert_eq!(line.kind, WinKind::Scatter);
        assert_eq!(line.position, 5);
        assert_eq!(line.count, 5);
        assert_eq!(line.symbol, Grape);
        assert_eq!(eval.total_win, Decimal::new(80, 0));

        let eval = evaluator(&[]).evaluate(&board, bet()).unwrap();
        assert_eq!(eval.total_win, Decimal::ZERO);
    }

    #[test]
    fn test_payout_keeps_cents_exact() {
        let board = Board::from_cells([
            [Lemon, Lemon, Lemon],
            [Plum, Bell, Grape],
            [Watermelon, Bar, Seven],
        ]);
        // 1.5 x 0.33 = 0.495, no rounding
        let eval = evaluator(&[]).evaluate(&board, Decimal::new(33, 2)).unwrap();
        assert_eq!(eval.total_win, Decimal::new(495, 3));
    }

    #[test]
    fn test_huge_bet_is_an_error_not_a_panic() {
        let board = Board::from_cells([[Diamond; 3]; 3]);
        let bet = Decimal::from_i128_with_scale(10_i128.pow(26), 0);
        let err = evaluator(&[5]).evaluate(&board, bet).unwrap_err();
        assert!(matches!(err, SettleError::AmountOverflow(_)));
    }

    #[test]
    fn test_win_beyond_storage_range_rejected() {
        let board = Board::from_cells([[Diamond; 3]; 3]);
        // 8 lines + 1 scatter at 100x is 9e22, past the 22 integer digits
        let bet = Decimal::from_i128_with_scale(10_i128.pow(20), 0);
        assert!(matches!(
            evaluator(&[5]).evaluate(&board, bet),
            Err(SettleError::AmountOverflow(_))
        ));

        let bet = Decimal::from_i128_with_scale(10_i128.pow(18), 0);
        let eval = evaluator(&[5]).evaluate(&board, bet).unwrap();
        assert_eq!(eval.total_win, bet * Decimal::from(900));
    }

    #[test]
    fn test_scatter_rule_normalizes_thresholds() {
        let rule = ScatterRule::new([7, 0, 5, 12, 5]);
        assert_eq!(rule.thresholds(), &[5, 7]);
        assert!(ScatterRule::disabled().thresholds().is_empty());
    }
}
