//! Communication buffer descriptors ("arenas")
//!
//! An [`Arena`] describes the byte layout of one *shape class* of data that
//! can cross a process boundary while a graph runs: element type, repeat
//! count (elements per transmissible unit), and alignment. Tiles moving to a
//! non-owning rank are packed into a fresh aligned buffer through the arena,
//! which also counts the units it packs.
//!
//! Arenas are owned by the graph that registered them ([`ArenaSet`]) and are
//! released when the graph is destroyed; there is no global registry.

use crate::dtype::ElementType;
use crate::error::{Error, Result};
use crate::matrix::{AlignedBuf, TILE_ALIGN, TileView};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shape class of a transmissible unit
///
/// Exactly one arena exists per shape class per graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeClass {
    /// A full data tile of a target matrix
    Tile,
    /// A column-workspace tile of a reduction
    ColWorkspace,
    /// A grid-cell workspace tile of a reduction
    CellWorkspace,
}

/// Typed, sized, aligned descriptor for one shape class of transfers
///
/// Immutable for the lifetime of the graph that registered it.
pub struct Arena {
    class: ShapeClass,
    dtype: ElementType,
    repeat: usize,
    align: usize,
    packed: AtomicUsize,
}

impl Arena {
    /// Arena for full `mb × nb` data tiles of element type `dtype`
    pub fn tile(dtype: ElementType, mb: usize, nb: usize) -> Self {
        Self::rectangle(ShapeClass::Tile, dtype, mb, nb)
    }

    /// Arena for `rows × cols` rectangular units of element type `dtype`
    pub fn rectangle(class: ShapeClass, dtype: ElementType, rows: usize, cols: usize) -> Self {
        Self {
            class,
            dtype,
            repeat: rows * cols,
            align: TILE_ALIGN,
            packed: AtomicUsize::new(0),
        }
    }

    /// Shape class this arena serves
    #[inline]
    pub fn class(&self) -> ShapeClass {
        self.class
    }

    /// Element type of packed units
    #[inline]
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Elements per transmissible unit
    #[inline]
    pub fn repeat(&self) -> usize {
        self.repeat
    }

    /// Required alignment of packed units, in bytes
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Size of one transmissible unit in bytes
    #[inline]
    pub fn unit_bytes(&self) -> usize {
        self.repeat * self.dtype.size_in_bytes()
    }

    /// Number of units packed for cross-rank movement so far
    pub fn packed_units(&self) -> usize {
        self.packed.load(Ordering::Relaxed)
    }

    /// Pack a tile into a fresh aligned buffer for transfer
    pub(crate) fn pack(&self, view: &TileView<'_>) -> Result<PackedTile> {
        debug_assert_eq!(view.dtype(), self.dtype);
        debug_assert_eq!(view.bytes().len(), self.unit_bytes());

        let mut buf = AlignedBuf::zeroed(self.unit_bytes())?;
        buf.as_mut_slice().copy_from_slice(view.bytes());
        self.packed.fetch_add(1, Ordering::Relaxed);

        Ok(PackedTile {
            buf,
            dtype: view.dtype(),
            rows: view.rows(),
            cols: view.cols(),
            stride: view.stride(),
        })
    }
}

/// A tile copied into transfer layout; owns its buffer
pub(crate) struct PackedTile {
    buf: AlignedBuf,
    dtype: ElementType,
    rows: usize,
    cols: usize,
    stride: usize,
}

impl PackedTile {
    /// View of the packed unit, carrying the source tile's logical extent
    pub(crate) fn view(&self) -> TileView<'_> {
        TileView::new(self.buf.as_slice(), self.dtype, self.rows, self.cols, self.stride)
    }
}

/// Graph-scoped arena registry
///
/// Enforces the one-arena-per-shape-class invariant; dropped as a whole when
/// the owning graph is destroyed.
pub struct ArenaSet {
    arenas: Vec<Arc<Arena>>,
}

impl ArenaSet {
    pub(crate) fn new() -> Self {
        Self { arenas: Vec::new() }
    }

    /// Register an arena, failing if its shape class is already present
    pub(crate) fn register(&mut self, arena: Arena) -> Result<Arc<Arena>> {
        if self.get(arena.class()).is_some() {
            return Err(Error::invalid_argument(
                "arena",
                format!("shape class {:?} already registered", arena.class()),
            ));
        }
        let arena = Arc::new(arena);
        self.arenas.push(Arc::clone(&arena));
        Ok(arena)
    }

    /// Arena registered for a shape class, if any
    pub fn get(&self, class: ShapeClass) -> Option<&Arc<Arena>> {
        self.arenas.iter().find(|a| a.class() == class)
    }

    /// Number of registered arenas
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// True if no arena is registered
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }
}
