//! 3x3 board
//!
//! Filled row-major from a `SymbolDraw`, read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::drawer::SymbolDraw;
use super::symbol::Symbol;

pub const ROWS: usize = 3;
pub const COLS: usize = 3;

/// One of the 8 canonical lines of a 3x3 grid
///
/// Diagonal 0 runs top-left to bottom-right, diagonal 1 top-right to bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Row(u8),
    Column(u8),
    Diagonal(u8),
}

impl Line {
    /// Evaluation order: rows, columns, diagonals
    pub const ALL: [Line; 8] = [
        Line::Row(0),
        Line::Row(1),
        Line::Row(2),
        Line::Column(0),
        Line::Column(1),
        Line::Column(2),
        Line::Diagonal(0),
        Line::Diagonal(1),
    ];

    /// (row, col) of the three cells on this line
    pub fn cells(&self) -> [(usize, usize); 3] {
        match *self {
            Line::Row(r) => {
                let r = r as usize;
                [(r, 0), (r, 1), (r, 2)]
            }
            Line::Column(c) => {
                let c = c as usize;
                [(0, c), (1, c), (2, c)]
            }
            Line::Diagonal(0) => [(0, 0), (1, 1), (2, 2)],
            Line::Diagonal(_) => [(0, 2), (1, 1), (2, 0)],
        }
    }

    pub fn index(&self) -> u8 {
        match *self {
            Line::Row(i) | Line::Column(i) | Line::Diagonal(i) => i,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Symbol; COLS]; ROWS],
}

impl Board {
    /// Draw 9 independent cells, row-major.
    pub fn fill(drawer: &dyn SymbolDraw) -> Self {
        let mut cells = [[Symbol::Cherry; COLS]; ROWS];
        for row in cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = drawer.draw();
            }
        }
        Self { cells }
    }

    /// Rebuild a board from stored cells (audit, tests)
    pub fn from_cells(cells: [[Symbol; COLS]; ROWS]) -> Self {
        Self { cells }
    }

    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Symbol {
        self.cells[row][col]
    }

    pub fn cells(&self) -> &[[Symbol; COLS]; ROWS] {
        &self.cells
    }

    /// Frequency of every symbol present on the board
    pub fn symbol_counts(&self) -> BTreeMap<Symbol, u8> {
        let mut counts = BTreeMap::new();
        for symbol in self.cells.iter().flatten() {
            *counts.entry(*symbol).or_insert(0u8) += 1;
        }
        counts
    }

    /// Positions holding `symbol`, in row-major scan order
    pub fn positions_of(&self, symbol: Symbol) -> Vec<(u8, u8)> {
        let mut positions = Vec::new();
        for (r, row) in self.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if *cell == symbol {
                    positions.push((r as u8, c as u8));
                }
            }
        }
        positions
    }

    pub fn line(&self, line: Line) -> [Symbol; 3] {
        line.cells().map(|(r, c)| self.cells[r][c])
    }
}
