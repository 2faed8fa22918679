//! # tilr
//!
//! **Task graphs for tile operations and reductions over distributed dense matrices.**
//!
//! tilr describes dense matrices as 2D grids of tiles spread across a `P x Q`
//! process grid with cyclic ownership, and turns whole-matrix operations into
//! explicit task graphs: per-tile operator application, norm-style reductions,
//! and panel factorization sweeps.
//!
//! ## Why tilr?
//!
//! - **Owner computes**: every task is pinned to the rank owning its output tile
//! - **Explicit data movement**: tiles cross rank boundaries only through typed,
//!   aligned arena buffers the graph registers up front
//! - **Graph-scoped resources**: arenas, workspaces, and scratch pools belong to
//!   one graph and vanish when it is destroyed
//! - **Staged schedules**: reductions run as ordered layers, so cross-rank sums
//!   complete before any maximum is taken
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilr::prelude::*;
//!
//! let grid = ProcessGrid::new(2, 2)?;
//! let a = TiledMatrix::from_fn(1000, 1000, 128, 128, grid, |i, j| (i + j) as f64)?;
//! let b = TiledMatrix::zeros(ElementType::F64, 1000, 1000, 128, 128, grid)?;
//!
//! let engine = LocalEngine::new();
//! map2(&engine, Region::Lower, &a, &b, copy_operator(), Arc::new(()))?;
//! let fro = norm(&engine, NormKind::Frobenius, &b)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): run a layer's tasks in parallel

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod engine;
pub mod error;
pub mod graph;
pub mod grid;
pub mod matrix;
pub mod ops;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{Complex64, Complex128, Element, ElementType};
    pub use crate::engine::{Engine, LocalEngine};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{Graph, GraphState, ShapeClass};
    pub use crate::grid::ProcessGrid;
    pub use crate::matrix::{TileView, TileViewMut, TiledMatrix};
    pub use crate::ops::{
        NormKind, Region, ResultCell, ScaleArgs, StatusCell, copy_operator, factor, factor_graph,
        map, map2, map2_graph, map_graph, norm, norm_graph, scale_operator, scaled_add_operator,
    };
}
