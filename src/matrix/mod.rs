//! Distributed tiled matrices
//!
//! A [`TiledMatrix`] describes an `rows × cols` dense matrix cut into
//! `mb × nb` tiles, distributed cyclically over a [`ProcessGrid`]. The tile
//! is the unit of storage, ownership, and task scheduling: graph builders
//! key every task by a tile coordinate (m, n) with 0 ≤ m < mt, 0 ≤ n < nt.
//!
//! # Edge tiles
//!
//! Tile shape is uniform except at the matrix edges. Edge tiles are stored
//! at full `mb × nb` extent (zero padded) but expose a smaller *logical*
//! extent through [`TileView::rows`]/[`TileView::cols`]; operators and
//! reductions only read the logical region.
//!
//! # Sharing
//!
//! Matrices are handed to graph builders as `Arc<TiledMatrix>`. Per-tile
//! read/write locks make a read-only input matrix shareable across
//! concurrent tasks while a different matrix's tiles are mutated in place.

mod storage;

pub(crate) use storage::{AlignedBuf, TILE_ALIGN};

use crate::dtype::{Element, ElementType};
use crate::error::{Error, Result};
use crate::grid::ProcessGrid;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Copyable shape summary of a tiled matrix
///
/// Returned by [`TiledMatrix::shape`] and by graph inspection accessors so
/// tests can verify workspace sizing without touching tile storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatrixShape {
    /// Global element rows
    pub rows: usize,
    /// Global element columns
    pub cols: usize,
    /// Tile row count (elements per tile, row dimension)
    pub mb: usize,
    /// Tile column count (elements per tile, column dimension)
    pub nb: usize,
    /// Number of tile rows
    pub mt: usize,
    /// Number of tile columns
    pub nt: usize,
    /// Element type of every tile
    pub dtype: ElementType,
}

/// A dense matrix stored as distributed `mb × nb` tiles
///
/// The descriptor is never owned by a graph, only referenced (`Arc`);
/// workspaces a reduction creates internally are `TiledMatrix` values too,
/// owned by their graph and released when the graph is destroyed.
pub struct TiledMatrix {
    dtype: ElementType,
    rows: usize,
    cols: usize,
    mb: usize,
    nb: usize,
    mt: usize,
    nt: usize,
    grid: ProcessGrid,
    tiles: Vec<RwLock<AlignedBuf>>,
}

impl TiledMatrix {
    /// Create a zero-filled tiled matrix
    ///
    /// `mb`/`nb` must be at least 1; `rows`/`cols` of zero are allowed and
    /// produce a matrix with no tiles.
    pub fn zeros(
        dtype: ElementType,
        rows: usize,
        cols: usize,
        mb: usize,
        nb: usize,
        grid: ProcessGrid,
    ) -> Result<Arc<Self>> {
        if mb == 0 || nb == 0 {
            return Err(Error::invalid_argument(
                "tile_shape",
                format!("tile shape must be at least 1x1, got {mb}x{nb}"),
            ));
        }

        let mt = rows.div_ceil(mb);
        let nt = cols.div_ceil(nb);
        let tile_bytes = mb * nb * dtype.size_in_bytes();

        let mut tiles = Vec::with_capacity(mt * nt);
        for _ in 0..mt * nt {
            tiles.push(RwLock::new(AlignedBuf::zeroed(tile_bytes)?));
        }

        Ok(Arc::new(Self {
            dtype,
            rows,
            cols,
            mb,
            nb,
            mt,
            nt,
            grid,
            tiles,
        }))
    }

    /// Create a tiled matrix filled from a function of global element indices
    ///
    /// `f(i, j)` produces the element at global row `i`, column `j`. The
    /// element type is taken from `T`.
    pub fn from_fn<T, F>(
        rows: usize,
        cols: usize,
        mb: usize,
        nb: usize,
        grid: ProcessGrid,
        f: F,
    ) -> Result<Arc<Self>>
    where
        T: Element,
        F: Fn(usize, usize) -> T,
    {
        let mat = Self::zeros(T::DTYPE, rows, cols, mb, nb, grid)?;
        for m in 0..mat.mt {
            for n in 0..mat.nt {
                let mut guard = mat.tile_mut(m, n);
                let mut view = guard.view_mut();
                let stride = view.stride();
                let s = view.as_slice_mut::<T>();
                for i in 0..mat.tile_rows(m) {
                    for j in 0..mat.tile_cols(n) {
                        s[i * stride + j] = f(m * mb + i, n * nb + j);
                    }
                }
            }
        }
        Ok(mat)
    }

    /// Element type of every tile
    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Global element rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Global element columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements per tile in the row dimension
    #[inline]
    pub fn mb(&self) -> usize {
        self.mb
    }

    /// Elements per tile in the column dimension
    #[inline]
    pub fn nb(&self) -> usize {
        self.nb
    }

    /// Number of tile rows
    #[inline]
    pub fn mt(&self) -> usize {
        self.mt
    }

    /// Number of tile columns
    #[inline]
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Process grid the tiles are distributed over
    #[inline]
    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    /// Copyable shape summary
    pub fn shape(&self) -> MatrixShape {
        MatrixShape {
            rows: self.rows,
            cols: self.cols,
            mb: self.mb,
            nb: self.nb,
            mt: self.mt,
            nt: self.nt,
            dtype: self.dtype,
        }
    }

    /// Logical row count of tile row `m` (smaller than `mb` at the edge)
    #[inline]
    pub fn tile_rows(&self, m: usize) -> usize {
        debug_assert!(m < self.mt);
        (self.rows - m * self.mb).min(self.mb)
    }

    /// Logical column count of tile column `n` (smaller than `nb` at the edge)
    #[inline]
    pub fn tile_cols(&self, n: usize) -> usize {
        debug_assert!(n < self.nt);
        (self.cols - n * self.nb).min(self.nb)
    }

    /// Rank of the process owning tile (m, n)
    #[inline]
    pub fn owner_of(&self, m: usize, n: usize) -> usize {
        self.grid.owner_of(m, n)
    }

    /// Acquire a read lock on tile (m, n)
    pub fn tile(&self, m: usize, n: usize) -> TileGuard<'_> {
        debug_assert!(m < self.mt && n < self.nt);
        TileGuard {
            guard: self.tiles[m * self.nt + n].read(),
            dtype: self.dtype,
            rows: self.tile_rows(m),
            cols: self.tile_cols(n),
            stride: self.nb,
        }
    }

    /// Acquire a write lock on tile (m, n)
    pub fn tile_mut(&self, m: usize, n: usize) -> TileGuardMut<'_> {
        debug_assert!(m < self.mt && n < self.nt);
        TileGuardMut {
            guard: self.tiles[m * self.nt + n].write(),
            dtype: self.dtype,
            rows: self.tile_rows(m),
            cols: self.tile_cols(n),
            stride: self.nb,
        }
    }

    /// Copy the matrix into a dense row-major vector
    ///
    /// Fails with `InvalidArgument` if `T` does not match the matrix's
    /// element type.
    pub fn to_dense<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::invalid_argument(
                "T",
                format!("requested {} from a {} matrix", T::DTYPE, self.dtype),
            ));
        }
        let mut out = vec![T::zero(); self.rows * self.cols];
        for m in 0..self.mt {
            for n in 0..self.nt {
                let guard = self.tile(m, n);
                let view = guard.view();
                let s = view.as_slice::<T>();
                for i in 0..self.tile_rows(m) {
                    for j in 0..self.tile_cols(n) {
                        out[(m * self.mb + i) * self.cols + n * self.nb + j] =
                            s[i * view.stride() + j];
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Read lock over one tile's storage
pub struct TileGuard<'a> {
    guard: RwLockReadGuard<'a, AlignedBuf>,
    dtype: ElementType,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl TileGuard<'_> {
    /// Read-only view of the locked tile
    pub fn view(&self) -> TileView<'_> {
        TileView {
            bytes: self.guard.as_slice(),
            dtype: self.dtype,
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
        }
    }
}

/// Write lock over one tile's storage
pub struct TileGuardMut<'a> {
    guard: RwLockWriteGuard<'a, AlignedBuf>,
    dtype: ElementType,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl TileGuardMut<'_> {
    /// Read-only view of the locked tile
    pub fn view(&self) -> TileView<'_> {
        TileView {
            bytes: self.guard.as_slice(),
            dtype: self.dtype,
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
        }
    }

    /// Mutable view of the locked tile
    pub fn view_mut(&mut self) -> TileViewMut<'_> {
        TileViewMut {
            dtype: self.dtype,
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
            bytes: self.guard.as_mut_slice(),
        }
    }
}

/// Read-only view of one tile
///
/// `rows`/`cols` are the logical extent (edge tiles are smaller than the
/// storage); element (i, j) lives at index `i * stride + j` of the typed
/// slice.
#[derive(Copy, Clone)]
pub struct TileView<'a> {
    bytes: &'a [u8],
    dtype: ElementType,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl<'a> TileView<'a> {
    pub(crate) fn new(
        bytes: &'a [u8],
        dtype: ElementType,
        rows: usize,
        cols: usize,
        stride: usize,
    ) -> Self {
        Self {
            bytes,
            dtype,
            rows,
            cols,
            stride,
        }
    }

    /// Logical row count
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical column count
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements per storage row
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Element type of the tile
    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Typed view of the full tile storage
    ///
    /// `T` must match the tile's element type; checked in debug builds. The
    /// slice borrows the tile storage itself, not the view value, so it may
    /// outlive the `TileView` it was taken from.
    #[inline]
    pub fn as_slice<T: Element>(&self) -> &'a [T] {
        debug_assert_eq!(T::DTYPE, self.dtype);
        bytemuck::cast_slice(self.bytes)
    }

    /// Raw bytes of the full tile storage
    #[inline]
    pub(crate) fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Mutable view of one tile
pub struct TileViewMut<'a> {
    bytes: &'a mut [u8],
    dtype: ElementType,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl TileViewMut<'_> {
    /// Logical row count
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical column count
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements per storage row
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Element type of the tile
    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Typed read view of the full tile storage
    #[inline]
    pub fn as_slice<T: Element>(&self) -> &[T] {
        debug_assert_eq!(T::DTYPE, self.dtype);
        bytemuck::cast_slice(self.bytes)
    }

    /// Typed mutable view of the full tile storage
    #[inline]
    pub fn as_slice_mut<T: Element>(&mut self) -> &mut [T] {
        debug_assert_eq!(T::DTYPE, self.dtype);
        bytemuck::cast_slice_mut(self.bytes)
    }
}
