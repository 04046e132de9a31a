//! Tiling geometry.
//!
//! A matrix with `m` rows and `n` columns is split into `row_blocks × col_blocks` tiles of size
//! `b × b`, where the tiles on the last tile row and the last tile column may be smaller. Tiles
//! are identified by their `(row, col)` block coordinates.
//!
//! The reflector coefficient matrix `T` uses the same column tiling. Each of its tiles holds the
//! square triangular factor of one panel factorization or one elimination, so the `T` tile
//! `(i, j)` is `ncols(j) × ncols(j)` and starts at row `i * b`, regardless of the height of the
//! matching matrix tile.

use crate::{utils::DivCeil, Error, Result};
use serde::Serialize;

mod storage;

pub use storage::TileStorage;

/// Block coordinates of a tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TileIndex {
    /// Tile row.
    pub row: usize,
    /// Tile column.
    pub col: usize,
}

impl TileIndex {
    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl core::fmt::Display for TileIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Which of the two tiled buffers a handle refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TileKind {
    /// The matrix being factorized.
    Matrix,
    /// The reflector coefficient matrix.
    Factor,
}

/// A tile of either the matrix or the reflector coefficient matrix. This is the unit of hazard
/// tracking.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DataHandle {
    pub kind: TileKind,
    pub index: TileIndex,
}

impl DataHandle {
    /// Handle of the matrix tile `(row, col)`.
    #[inline]
    pub const fn a(row: usize, col: usize) -> Self {
        Self {
            kind: TileKind::Matrix,
            index: TileIndex::new(row, col),
        }
    }

    /// Handle of the reflector coefficient tile `(row, col)`.
    #[inline]
    pub const fn t(row: usize, col: usize) -> Self {
        Self {
            kind: TileKind::Factor,
            index: TileIndex::new(row, col),
        }
    }
}

impl core::fmt::Display for DataHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self.kind {
            TileKind::Matrix => "A",
            TileKind::Factor => "T",
        };
        write!(f, "{name}{}", self.index)
    }
}

/// View descriptor of one tile: offset, extent and stride inside its buffer. Tiles never own or
/// copy data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    pub index: TileIndex,
    pub row_start: usize,
    pub col_start: usize,
    pub nrows: usize,
    pub ncols: usize,
    pub row_stride: usize,
}

impl Tile {
    /// Offset of the first element of the tile in its buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.row_start * self.row_stride + self.col_start
    }
}

/// Tiling of an `m × n` matrix with leading dimension `lda` into tiles of size `b`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileLayout {
    nrows: usize,
    ncols: usize,
    lda: usize,
    tile_size: usize,
    row_blocks: usize,
    col_blocks: usize,
}

impl TileLayout {
    /// Creates the tiling of an `nrows × ncols` matrix with leading dimension `lda`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `tile_size == 0` or `lda < ncols`.
    pub fn new(nrows: usize, ncols: usize, lda: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::Configuration("tile size must be positive".into()));
        }
        if lda < ncols {
            return Err(Error::Configuration(format!(
                "leading dimension {lda} is smaller than the number of columns {ncols}"
            )));
        }
        Ok(Self {
            nrows,
            ncols,
            lda,
            tile_size,
            row_blocks: nrows.msrv_div_ceil(tile_size),
            col_blocks: ncols.msrv_div_ceil(tile_size),
        })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn lda(&self) -> usize {
        self.lda
    }

    #[inline]
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// `ceil(m / b)`.
    #[inline]
    pub fn row_blocks(&self) -> usize {
        self.row_blocks
    }

    /// `ceil(n / b)`.
    #[inline]
    pub fn col_blocks(&self) -> usize {
        self.col_blocks
    }

    /// Number of panel iterations, `min(row_blocks, col_blocks)`.
    #[inline]
    pub fn diagonal_count(&self) -> usize {
        Ord::min(self.row_blocks, self.col_blocks)
    }

    /// Number of rows of the tiles on tile row `i`.
    #[inline]
    pub fn tile_nrows(&self, i: usize) -> usize {
        Ord::min(self.tile_size, self.nrows - i * self.tile_size)
    }

    /// Number of columns of the tiles on tile column `j`.
    #[inline]
    pub fn tile_ncols(&self, j: usize) -> usize {
        Ord::min(self.tile_size, self.ncols - j * self.tile_size)
    }

    /// Number of rows of the reflector coefficient matrix.
    #[inline]
    pub fn t_nrows(&self) -> usize {
        self.row_blocks * self.tile_size
    }

    /// Returns `true` if `index` lies inside the tiling.
    #[inline]
    pub fn contains(&self, index: TileIndex) -> bool {
        index.row < self.row_blocks && index.col < self.col_blocks
    }

    fn check(&self, index: TileIndex) -> Result<()> {
        if self.contains(index) {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index,
                row_blocks: self.row_blocks,
                col_blocks: self.col_blocks,
            })
        }
    }

    /// Returns the view descriptor of the matrix tile at `index`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `index` is outside of the tiling.
    pub fn tile(&self, index: TileIndex) -> Result<Tile> {
        self.check(index)?;
        let b = self.tile_size;
        Ok(Tile {
            index,
            row_start: index.row * b,
            col_start: index.col * b,
            nrows: self.tile_nrows(index.row),
            ncols: self.tile_ncols(index.col),
            row_stride: self.lda,
        })
    }

    /// Returns the view descriptor of the reflector coefficient tile at `index`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `index` is outside of the tiling.
    pub fn t_tile(&self, index: TileIndex) -> Result<Tile> {
        self.check(index)?;
        let b = self.tile_size;
        let nk = self.tile_ncols(index.col);
        Ok(Tile {
            index,
            row_start: index.row * b,
            col_start: index.col * b,
            nrows: nk,
            ncols: nk,
            row_stride: self.ncols,
        })
    }

    /// Returns the view descriptor of the tile referred to by `handle`.
    pub fn resolve(&self, handle: DataHandle) -> Result<Tile> {
        match handle.kind {
            TileKind::Matrix => self.tile(handle.index),
            TileKind::Factor => self.t_tile(handle.index),
        }
    }

    /// Iterates over the tile coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileIndex> {
        let (rb, cb) = (self.row_blocks, self.col_blocks);
        (0..rb).flat_map(move |row| (0..cb).map(move |col| TileIndex::new(row, col)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn block_counts_round_up() {
        let layout = TileLayout::new(10, 7, 7, 3).unwrap();
        assert!(all(layout.row_blocks() == 4, layout.col_blocks() == 3));
        assert!(all(layout.tile_nrows(3) == 1, layout.tile_ncols(2) == 1));
        assert!(layout.diagonal_count() == 3);
    }

    #[test]
    fn tile_extents_sum_to_dimensions() {
        for (m, n, b) in [(1, 1, 1), (10, 7, 3), (8, 8, 4), (9, 4, 5), (5, 13, 2)] {
            let layout = TileLayout::new(m, n, n + 2, b).unwrap();
            let rows: usize = (0..layout.row_blocks())
                .map(|i| layout.tile(TileIndex::new(i, 0)).unwrap().nrows)
                .sum();
            let cols: usize = (0..layout.col_blocks())
                .map(|j| layout.tile(TileIndex::new(0, j)).unwrap().ncols)
                .sum();
            assert!(all(rows == m, cols == n));
        }
    }

    #[test]
    fn out_of_range_is_reported() {
        let layout = TileLayout::new(4, 4, 4, 2).unwrap();
        let err = layout.tile(TileIndex::new(2, 0)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { row_blocks: 2, col_blocks: 2, .. }));
        assert!(layout.t_tile(TileIndex::new(0, 5)).is_err());
    }

    #[test]
    fn invalid_configuration() {
        assert!(matches!(TileLayout::new(4, 4, 4, 0), Err(Error::Configuration(_))));
        assert!(matches!(TileLayout::new(4, 4, 3, 2), Err(Error::Configuration(_))));
    }

    #[test]
    fn tile_offsets_use_the_leading_dimension() {
        let layout = TileLayout::new(6, 5, 8, 2).unwrap();
        let tile = layout.tile(TileIndex::new(2, 2)).unwrap();
        assert!(all(tile.offset() == 4 * 8 + 4, tile.nrows == 2, tile.ncols == 1));

        let t = layout.t_tile(TileIndex::new(1, 2)).unwrap();
        assert!(all(t.offset() == 2 * 5 + 4, t.nrows == 1, t.ncols == 1));
        assert!(layout.t_nrows() == 6);
    }

    #[test]
    fn handles_display_their_buffer() {
        assert!(DataHandle::a(1, 2).to_string() == "A(1, 2)");
        assert!(DataHandle::t(0, 3).to_string() == "T(0, 3)");
    }
}
