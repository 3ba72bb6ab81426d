//! Grid geometry, the Conway rule, and initial patterns.
//!
//! Pure helpers shared by the worker state machine and the runner: no
//! I/O, no shared state.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Edges
// ============================================================================

/// What happens to a neighborhood at the edge of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edges {
    /// Out-of-bounds neighbors are dropped; edge cells have fewer than 8.
    Clip,
    /// Coordinates wrap modulo the grid size (torus).
    Wrap,
}

/// Computes a cell's neighbor coordinates.
///
/// Up to 8 neighbors in row-major offset order, deduplicated: on a
/// wrapped grid smaller than 3×3 several offsets land on the same cell,
/// which then counts once.
#[must_use]
pub fn neighbors(row: u16, col: u16, size: u16, edges: Edges) -> Vec<(u16, u16)> {
    let size = i32::from(size);
    let mut result = Vec::with_capacity(8);

    for dr in -1..=1i32 {
        for dc in -1..=1i32 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let (r, c) = (i32::from(row) + dr, i32::from(col) + dc);
            let coord = match edges {
                Edges::Clip => {
                    if r < 0 || r >= size || c < 0 || c >= size {
                        continue;
                    }
                    (r as u16, c as u16)
                }
                Edges::Wrap => ((r.rem_euclid(size)) as u16, (c.rem_euclid(size)) as u16),
            };
            if !result.contains(&coord) {
                result.push(coord);
            }
        }
    }

    result
}

// ============================================================================
// Rule
// ============================================================================

/// The standard Conway rule: birth on exactly 3 live neighbors,
/// survival on exactly 2.
#[inline]
#[must_use]
pub const fn next_state(alive: bool, live_neighbors: usize) -> bool {
    live_neighbors == 3 || (alive && live_neighbors == 2)
}

// ============================================================================
// Pattern
// ============================================================================

/// An initial grid configuration parsed from text.
///
/// Each input line is one row; `.` and space are dead, anything else is
/// alive. Shorter rows are padded with dead cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    size: u16,
    cells: Vec<bool>,
}

impl Pattern {
    /// Parses a pattern into a `size × size` grid, optionally centered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequencing`] if the pattern has more rows or
    /// columns than the grid.
    pub fn parse(text: &str, size: u16, center: bool) -> Result<Self> {
        let rows: Vec<&str> = text.lines().map(str::trim_end).collect();

        let height = rows.len();
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0);
        if height > size as usize {
            return Err(Error::sequencing(format!(
                "pattern has {height} rows, grid only {size}; increase the size"
            )));
        }
        if width > size as usize {
            return Err(Error::sequencing(format!(
                "pattern has {width} columns, grid only {size}; increase the size"
            )));
        }

        let (top, left) = if center {
            (
                (size as usize - height) / 2,
                (size as usize - width) / 2,
            )
        } else {
            (0, 0)
        };

        let mut cells = vec![false; size as usize * size as usize];
        for (r, row) in rows.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                if ch != '.' && ch != ' ' {
                    cells[(top + r) * size as usize + left + c] = true;
                }
            }
        }

        Ok(Self { size, cells })
    }

    /// Returns the grid edge length.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u16 {
        self.size
    }

    /// Returns whether the cell starts alive.
    #[must_use]
    pub fn alive(&self, row: u16, col: u16) -> bool {
        self.cells[row as usize * self.size as usize + col as usize]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Advances a whole grid one generation, for rule-level tests.
    fn step_grid(grid: &[Vec<bool>], edges: Edges) -> Vec<Vec<bool>> {
        let size = grid.len() as u16;
        (0..size)
            .map(|row| {
                (0..size)
                    .map(|col| {
                        let live = neighbors(row, col, size, edges)
                            .into_iter()
                            .filter(|&(r, c)| grid[r as usize][c as usize])
                            .count();
                        next_state(grid[row as usize][col as usize], live)
                    })
                    .collect()
            })
            .collect()
    }

    fn grid_from(pattern: &str, size: u16) -> Vec<Vec<bool>> {
        let pattern = Pattern::parse(pattern, size, true).unwrap();
        (0..size)
            .map(|row| (0..size).map(|col| pattern.alive(row, col)).collect())
            .collect()
    }

    #[test]
    fn test_interior_cell_has_eight_neighbors() {
        let n = neighbors(2, 2, 5, Edges::Clip);
        assert_eq!(n.len(), 8);
        assert!(n.contains(&(1, 1)));
        assert!(n.contains(&(3, 3)));
        assert!(!n.contains(&(2, 2)));
    }

    #[test]
    fn test_clipped_corner_has_three_neighbors() {
        let mut n = neighbors(0, 0, 5, Edges::Clip);
        n.sort_unstable();
        assert_eq!(n, vec![(0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_wrapped_corner_has_eight_neighbors() {
        let n = neighbors(0, 0, 5, Edges::Wrap);
        assert_eq!(n.len(), 8);
        assert!(n.contains(&(4, 4)));
        assert!(n.contains(&(4, 0)));
        assert!(n.contains(&(0, 4)));
    }

    #[test]
    fn test_wrapped_tiny_grid_deduplicates() {
        // On a wrapped 2×2 every offset lands on one of the 3 other
        // cells; each counts once.
        let n = neighbors(0, 0, 2, Edges::Wrap);
        assert_eq!(n.len(), 3);
    }

    #[test]
    fn test_conway_rule_table() {
        // Birth on exactly 3.
        assert!(next_state(false, 3));
        assert!(!next_state(false, 2));
        assert!(!next_state(false, 4));
        // Survival on 2 or 3.
        assert!(next_state(true, 2));
        assert!(next_state(true, 3));
        // Under- and overpopulation.
        assert!(!next_state(true, 1));
        assert!(!next_state(true, 4));
    }

    #[test]
    fn test_blinker_oscillates_with_period_two() {
        // Horizontal 3-cell blinker centered on a 5×5 grid.
        let horizontal = grid_from("###", 5);
        let vertical = step_grid(&horizontal, Edges::Clip);

        // One step rotates it to vertical through the center.
        for row in 0..5 {
            for col in 0..5 {
                let expected = col == 2 && (1..=3).contains(&row);
                assert_eq!(vertical[row][col], expected, "({row}, {col})");
            }
        }

        // Further steps alternate between the two; period 2 holds.
        let mut grid = vertical.clone();
        for generation in 1..=6 {
            grid = step_grid(&grid, Edges::Clip);
            let expected = if generation % 2 == 1 {
                &horizontal
            } else {
                &vertical
            };
            assert_eq!(&grid, expected, "generation {generation}");
        }
    }

    #[test]
    fn test_pattern_centering() {
        let pattern = Pattern::parse("#", 5, true).unwrap();
        assert!(pattern.alive(2, 2));
        assert_eq!((0..5).flat_map(|r| (0..5).map(move |c| (r, c)))
            .filter(|&(r, c)| pattern.alive(r, c))
            .count(), 1);
    }

    #[test]
    fn test_pattern_uncentered() {
        let pattern = Pattern::parse("#.\n.#", 4, false).unwrap();
        assert!(pattern.alive(0, 0));
        assert!(pattern.alive(1, 1));
        assert!(!pattern.alive(0, 1));
    }

    #[test]
    fn test_pattern_too_large_rejected() {
        assert!(Pattern::parse("####", 3, true).is_err());
        assert!(Pattern::parse("#\n#\n#\n#", 3, true).is_err());
    }
}
