//! Heuristic filter for detector output.
//!
//! Ruling-line detectors happily emit grids for page borders, signature
//! boxes and underlines. A real table needs a header plus a data row, at
//! least two columns, and at least 40 % of its cells filled.

use crate::output::Grid;

/// Minimum share of non-blank cells for a grid to count as data.
pub const MIN_FILL_RATIO: f64 = 0.4;

/// Decide whether a raw grid is a real table.
pub fn is_valid_table(grid: &Grid) -> bool {
    if grid.len() < 2 {
        return false;
    }

    let widest = grid.iter().map(Vec::len).max().unwrap_or(0);
    if widest < 2 {
        return false;
    }

    let total: usize = grid.iter().map(Vec::len).sum();
    let filled = grid
        .iter()
        .flatten()
        .filter(|cell| cell.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .count();

    total > 0 && (filled as f64 / total as f64) >= MIN_FILL_RATIO
}
