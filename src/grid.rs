//! Process grid and tile ownership mapping
//!
//! Tiles of a distributed matrix are assigned to processes arranged in a
//! logical P×Q grid, cyclically in both dimensions: tile (m, n) belongs to
//! grid cell (m mod P, n mod Q). Ranks are row-major over the grid, so the
//! owner of tile (m, n) is `(m mod P) * Q + (n mod Q)`.

use crate::error::{Error, Result};

/// Logical arrangement of participating processes into P rows and Q columns
///
/// The grid is pure bookkeeping: it never allocates anything and is copied
/// freely between matrix descriptors. The per-process core count is advisory
/// metadata for engines that partition work per core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcessGrid {
    rows: usize,
    cols: usize,
    cores: usize,
}

impl ProcessGrid {
    /// Create a P×Q grid with one advisory core per process
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        Self::with_cores(rows, cols, 1)
    }

    /// Create a P×Q grid with an explicit per-process core count
    pub fn with_cores(rows: usize, cols: usize, cores: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::invalid_argument(
                "grid",
                format!("process grid must be at least 1x1, got {rows}x{cols}"),
            ));
        }
        if cores == 0 {
            return Err(Error::invalid_argument("cores", "core count must be at least 1"));
        }
        Ok(Self { rows, cols, cores })
    }

    /// Number of grid rows (P)
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of grid columns (Q)
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of processes (P·Q)
    #[inline]
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Advisory per-process core count
    #[inline]
    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Grid row owning tile row `m`
    #[inline]
    pub fn row_of(&self, m: usize) -> usize {
        m % self.rows
    }

    /// Grid column owning tile column `n`
    #[inline]
    pub fn col_of(&self, n: usize) -> usize {
        n % self.cols
    }

    /// Rank of the process owning tile (m, n)
    #[inline]
    pub fn owner_of(&self, m: usize, n: usize) -> usize {
        self.row_of(m) * self.cols + self.col_of(n)
    }

    /// Rank of the process at grid cell (p, q)
    #[inline]
    pub fn rank_at(&self, p: usize, q: usize) -> usize {
        debug_assert!(p < self.rows && q < self.cols);
        p * self.cols + q
    }

    /// Grid cell (p, q) of a rank
    #[inline]
    pub fn coords_of(&self, rank: usize) -> (usize, usize) {
        debug_assert!(rank < self.size());
        (rank / self.cols, rank % self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_grid() {
        assert!(ProcessGrid::new(0, 2).is_err());
        assert!(ProcessGrid::new(2, 0).is_err());
        assert!(ProcessGrid::with_cores(2, 2, 0).is_err());
    }

    #[test]
    fn test_cyclic_ownership() {
        let grid = ProcessGrid::new(2, 3).unwrap();
        assert_eq!(grid.owner_of(0, 0), 0);
        assert_eq!(grid.owner_of(0, 1), 1);
        assert_eq!(grid.owner_of(0, 2), 2);
        assert_eq!(grid.owner_of(1, 0), 3);
        // Wraps in both dimensions
        assert_eq!(grid.owner_of(2, 3), 0);
        assert_eq!(grid.owner_of(3, 4), 4);
    }

    #[test]
    fn test_rank_coords_roundtrip() {
        let grid = ProcessGrid::new(3, 4).unwrap();
        for rank in 0..grid.size() {
            let (p, q) = grid.coords_of(rank);
            assert_eq!(grid.rank_at(p, q), rank);
        }
    }

    #[test]
    fn test_single_process_grid() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        for m in 0..5 {
            for n in 0..5 {
                assert_eq!(grid.owner_of(m, n), 0);
            }
        }
    }
}
