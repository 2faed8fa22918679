//! Graph builders for tile operations and reductions
//!
//! Each builder turns a description of work over tiled matrices into a
//! [`Graph`](crate::graph::Graph): per-tile binary and unary operator
//! application ([`map2_graph`], [`map_graph`]), norm-style reductions
//! ([`norm_graph`]), and panel factorization sweeps ([`factor_graph`]).
//! Every builder has a blocking companion that builds, enqueues, runs, and
//! destroys the graph in one call.
//!
//! Operators are capability values: plain closures wrapped in an `Arc`,
//! invoked once per scheduled tile with the execution context, the tile
//! views, and an opaque caller-supplied argument blob.

mod factor;
mod map;
mod map2;
mod norm;
mod operators;

pub use factor::{StatusCell, factor, factor_graph, panel_chunk_bytes, update_chunk_bytes};
pub use map::{map, map_graph};
pub use map2::{map2, map2_graph};
pub use norm::{NormKind, ResultCell, norm, norm_graph};
pub use operators::{ScaleArgs, copy_operator, scale_operator, scaled_add_operator};

use crate::error::Error;
use crate::graph::TaskContext;
use crate::matrix::{TileView, TileViewMut};
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

/// Tile-granularity region of a matrix an operation applies to
///
/// Membership is decided per tile index pair, never per element: a tile on
/// the diagonal belongs to both the upper and the lower region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Region {
    /// Every tile
    Full = 0,
    /// Tiles with `n >= m`, diagonal included
    Upper = 1,
    /// Tiles with `m >= n`, diagonal included
    Lower = 2,
}

impl Region {
    /// Whether tile `(m, n)` belongs to the region
    #[inline]
    pub const fn contains(self, m: usize, n: usize) -> bool {
        match self {
            Region::Full => true,
            Region::Upper => n >= m,
            Region::Lower => m >= n,
        }
    }

    /// Raw selector value
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Region {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Region::Full),
            1 => Ok(Region::Upper),
            2 => Ok(Region::Lower),
            other => {
                warn!(selector = other, "unrecognized region selector");
                Err(Error::invalid_argument(
                    "region",
                    format!("unrecognized region selector {other}"),
                ))
            }
        }
    }
}

/// Opaque caller-supplied arguments, retained by the graph until destruction
pub type OpArgs = Arc<dyn Any + Send + Sync>;

/// Binary per-tile operator: reads an `A` tile, updates the matching `B` tile
///
/// Invoked on the rank that owns the `B` tile with the region selector and
/// the tile coordinate.
pub type BinaryTileOp = Arc<
    dyn Fn(&TaskContext, &TileView<'_>, &mut TileViewMut<'_>, &(dyn Any + Send + Sync), Region, usize, usize)
        + Send
        + Sync,
>;

/// Unary per-tile operator: updates a tile of `A` in place
pub type UnaryTileOp = Arc<
    dyn Fn(&TaskContext, &mut TileViewMut<'_>, &(dyn Any + Send + Sync), Region, usize, usize)
        + Send
        + Sync,
>;

/// Panel factorization kernel for one diagonal step
///
/// Receives the diagonal tile, two scratch chunks, and the step index `k`;
/// returns a status code where zero means success and a positive value is
/// merged into the sweep's status by maximum.
pub type PanelOp = Arc<
    dyn Fn(&TaskContext, &mut TileViewMut<'_>, &mut [u8], &mut [u8], usize) -> i32 + Send + Sync,
>;
