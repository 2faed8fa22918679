//! Distributed norm-style reduction graphs
//!
//! A reduction runs in four staged layers:
//!
//! 1. every tile of `A` is reduced to a small partial on its owning rank;
//! 2. partials sharing a tile row (or column, for the one-norm) are combined
//!    into the column workspace on the rank that owns the target cell;
//! 3. column cells are combined into one grid-cell workspace entry per
//!    process, gathering across ranks where the kind requires it;
//! 4. a single task on rank zero gathers every grid cell and publishes the
//!    scalar result.
//!
//! Workspace extents depend on the kind: sum-based kinds carry whole row or
//! column vectors until stage 3 because entries must be summed across ranks
//! before any maximum is taken, while the max norm carries single cells and
//! the Frobenius norm carries scaled sum-of-squares pairs throughout.

use crate::dispatch_element;
use crate::dtype::{Element, ElementType};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graph::{Arena, ArenaSet, Graph, GraphParts, ShapeClass, Task, TaskContext, TaskLayer};
use crate::grid::ProcessGrid;
use crate::matrix::{MatrixShape, TileView, TiledMatrix};
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Reduction semantics selector
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NormKind {
    /// Largest absolute value of any element
    Max = 0,
    /// Largest row sum of absolute values
    Inf = 1,
    /// Largest column sum of absolute values
    One = 2,
    /// Square root of the sum of squared magnitudes
    Frobenius = 3,
}

impl NormKind {
    /// Decode a raw selector; unrecognized values fall back to [`NormKind::Max`]
    pub fn from_raw(value: i32) -> NormKind {
        match value {
            0 => NormKind::Max,
            1 => NormKind::Inf,
            2 => NormKind::One,
            3 => NormKind::Frobenius,
            other => {
                warn!(selector = other, "unrecognized norm kind, using max norm");
                NormKind::Max
            }
        }
    }

    /// Raw selector value
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Rows per grid-cell workspace entry
    const fn cell_height(self) -> usize {
        match self {
            NormKind::Frobenius => 2,
            _ => 1,
        }
    }

    /// Length of one per-tile partial
    const fn partial_width(self, mb: usize, nb: usize) -> usize {
        match self {
            NormKind::Max => 1,
            NormKind::Inf => mb,
            NormKind::One => nb,
            NormKind::Frobenius => 2,
        }
    }
}

/// Write-once destination for a reduction result
///
/// Caller-owned: the graph holds a reference and the final task publishes
/// into it, so the value survives graph destruction.
#[derive(Default)]
pub struct ResultCell {
    value: OnceLock<f64>,
}

impl ResultCell {
    /// Empty cell
    pub fn new() -> Self {
        Self::default()
    }

    /// The published result, once the graph has completed
    pub fn get(&self) -> Option<f64> {
        self.value.get().copied()
    }

    fn set(&self, value: f64) {
        let _ = self.value.set(value);
    }
}

/// Scaled sum-of-squares accumulator in the lassq style
///
/// Represents `scale^2 * ssq` without forming the square, so tiles with
/// entries near the overflow threshold still reduce exactly. The all-zero
/// pair is the neutral element.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct SumSq {
    scale: f64,
    ssq: f64,
}

impl SumSq {
    fn add(&mut self, x: f64) {
        let x = x.abs();
        if x == 0.0 {
            return;
        }
        if self.scale < x {
            self.ssq = 1.0 + self.ssq * (self.scale / x).powi(2);
            self.scale = x;
        } else {
            self.ssq += (x / self.scale).powi(2);
        }
    }

    fn merge(&mut self, other: SumSq) {
        if other.scale == 0.0 {
            return;
        }
        if self.scale == 0.0 {
            *self = other;
            return;
        }
        if self.scale < other.scale {
            self.ssq = other.ssq + self.ssq * (self.scale / other.scale).powi(2);
            self.scale = other.scale;
        } else {
            self.ssq += other.ssq * (other.scale / self.scale).powi(2);
        }
    }

    fn value(self) -> f64 {
        self.scale * self.ssq.sqrt()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct WorkspaceDims {
    mb: usize,
    nb: usize,
    rows: usize,
    cols: usize,
}

/// Column workspace sizing per kind, over a `p x q` grid
fn column_workspace_dims(kind: NormKind, p: usize, q: usize, shape: &MatrixShape) -> WorkspaceDims {
    match kind {
        NormKind::Max => WorkspaceDims { mb: 1, nb: 1, rows: shape.mt, cols: q },
        NormKind::Inf => WorkspaceDims {
            mb: shape.mb,
            nb: 1,
            rows: shape.mt * shape.mb,
            cols: q,
        },
        NormKind::One => WorkspaceDims {
            mb: 1,
            nb: shape.nb,
            rows: p,
            cols: shape.nt.max(q) * shape.nb,
        },
        NormKind::Frobenius => WorkspaceDims { mb: 2, nb: 1, rows: shape.mt * 2, cols: q },
    }
}

/// Grid-cell workspace sizing: one `elt x 1` cell per process
fn cell_workspace_dims(kind: NormKind, p: usize, q: usize) -> WorkspaceDims {
    let elt = kind.cell_height();
    WorkspaceDims { mb: elt, nb: 1, rows: elt * p, cols: q }
}

/// Stage-1 output slots, one per tile of `A`
struct PartialStore {
    nt: usize,
    slots: Vec<OnceLock<Box<[f64]>>>,
}

impl PartialStore {
    fn new(mt: usize, nt: usize) -> Self {
        Self { nt, slots: (0..mt * nt).map(|_| OnceLock::new()).collect() }
    }

    fn set(&self, m: usize, n: usize, partial: Box<[f64]>) {
        let _ = self.slots[m * self.nt + n].set(partial);
    }

    fn get(&self, m: usize, n: usize) -> Result<&[f64]> {
        self.slots[m * self.nt + n]
            .get()
            .map(Box::as_ref)
            .ok_or_else(|| Error::engine(format!("missing tile partial ({m}, {n})")))
    }
}

/// Reduce one tile of `A` to its per-tile partial
///
/// Partials only ever see the logical extent, so padding in edge tiles
/// cannot contribute. Complex elements contribute their magnitude.
fn tile_partial(kind: NormKind, view: &TileView<'_>, mb: usize, nb: usize) -> Box<[f64]> {
    let mut out = vec![0.0f64; kind.partial_width(mb, nb)];
    dispatch_element!(view.dtype(), T => {
        let s = view.as_slice::<T>();
        let stride = view.stride();
        match kind {
            NormKind::Max => {
                for i in 0..view.rows() {
                    for j in 0..view.cols() {
                        out[0] = out[0].max(s[i * stride + j].to_f64().abs());
                    }
                }
            }
            NormKind::Inf => {
                for i in 0..view.rows() {
                    for j in 0..view.cols() {
                        out[i] += s[i * stride + j].to_f64().abs();
                    }
                }
            }
            NormKind::One => {
                for i in 0..view.rows() {
                    for j in 0..view.cols() {
                        out[j] += s[i * stride + j].to_f64().abs();
                    }
                }
            }
            NormKind::Frobenius => {
                let mut acc = SumSq::default();
                for i in 0..view.rows() {
                    for j in 0..view.cols() {
                        acc.add(s[i * stride + j].to_f64());
                    }
                }
                out[0] = acc.scale;
                out[1] = acc.ssq;
            }
        }
    });
    out.into_boxed_slice()
}

/// Stage 2 for row-oriented kinds: fold the partials of tile row `m` whose
/// columns live on grid column `qq` into the column workspace cell `(m, qq)`
fn combine_into_column(
    kind: NormKind,
    store: &PartialStore,
    wcol: &TiledMatrix,
    grid: ProcessGrid,
    nt: usize,
    m: usize,
    qq: usize,
) -> Result<()> {
    let mut guard = wcol.tile_mut(m, qq);
    let mut view = guard.view_mut();
    let cell = view.as_slice_mut::<f64>();
    for n in (0..nt).filter(|&n| grid.col_of(n) == qq) {
        let part = store.get(m, n)?;
        match kind {
            NormKind::Max => cell[0] = cell[0].max(part[0]),
            NormKind::Inf => {
                for (c, v) in cell.iter_mut().zip(part.iter()) {
                    *c += v;
                }
            }
            NormKind::Frobenius => {
                let mut acc = SumSq { scale: cell[0], ssq: cell[1] };
                acc.merge(SumSq { scale: part[0], ssq: part[1] });
                cell[0] = acc.scale;
                cell[1] = acc.ssq;
            }
            NormKind::One => unreachable!("one-norm combines by column"),
        }
    }
    Ok(())
}

/// Stage 2 for the one-norm: fold the partials of tile column `n` whose rows
/// live on grid row `pp` into the column workspace cell `(pp, n)`
fn combine_into_row(
    store: &PartialStore,
    wcol: &TiledMatrix,
    grid: ProcessGrid,
    mt: usize,
    pp: usize,
    n: usize,
) -> Result<()> {
    let mut guard = wcol.tile_mut(pp, n);
    let mut view = guard.view_mut();
    let cell = view.as_slice_mut::<f64>();
    for m in (0..mt).filter(|&m| grid.row_of(m) == pp) {
        let part = store.get(m, n)?;
        for (c, v) in cell.iter_mut().zip(part.iter()) {
            *c += v;
        }
    }
    Ok(())
}

/// Stage 3: combine column workspace cells into the grid cell of `(pp, qq)`
///
/// Sum-based kinds gather a full row (or column) of workspace cells across
/// the grid here, summing before taking the maximum; each such gather goes
/// through the column arena when the cell is remote.
#[allow(clippy::too_many_arguments)]
fn combine_into_cell(
    ctx: &TaskContext,
    kind: NormKind,
    wcol: &TiledMatrix,
    welt: &TiledMatrix,
    col_arena: &Arena,
    grid: ProcessGrid,
    shape: MatrixShape,
    pp: usize,
    qq: usize,
) -> Result<()> {
    let (p, q) = (grid.rows(), grid.cols());
    let mut acc_max = 0.0f64;
    let mut acc_ssq = SumSq::default();

    match kind {
        NormKind::Max => {
            for m in (0..shape.mt).filter(|&m| grid.row_of(m) == pp) {
                let fetched = ctx.fetch(wcol, m, qq, col_arena)?;
                acc_max = acc_max.max(fetched.view().as_slice::<f64>()[0]);
            }
        }
        NormKind::Frobenius => {
            for m in (0..shape.mt).filter(|&m| grid.row_of(m) == pp) {
                let fetched = ctx.fetch(wcol, m, qq, col_arena)?;
                let s = fetched.view().as_slice::<f64>();
                acc_ssq.merge(SumSq { scale: s[0], ssq: s[1] });
            }
        }
        NormKind::Inf => {
            // tile row m is finalized on grid column m % q; the row sums
            // must be completed across every grid column before the max
            for m in (0..shape.mt).filter(|&m| grid.row_of(m) == pp && m % q == qq) {
                let mut totals = vec![0.0f64; shape.mb];
                for q2 in 0..q {
                    let fetched = ctx.fetch(wcol, m, q2, col_arena)?;
                    for (t, v) in totals.iter_mut().zip(fetched.view().as_slice::<f64>().iter()) {
                        *t += v;
                    }
                }
                for v in totals {
                    acc_max = acc_max.max(v);
                }
            }
        }
        NormKind::One => {
            for n in (0..shape.nt).filter(|&n| grid.col_of(n) == qq && n % p == pp) {
                let mut totals = vec![0.0f64; shape.nb];
                for p2 in 0..p {
                    let fetched = ctx.fetch(wcol, p2, n, col_arena)?;
                    for (t, v) in totals.iter_mut().zip(fetched.view().as_slice::<f64>().iter()) {
                        *t += v;
                    }
                }
                for v in totals {
                    acc_max = acc_max.max(v);
                }
            }
        }
    }

    let mut guard = welt.tile_mut(pp, qq);
    let mut view = guard.view_mut();
    let cell = view.as_slice_mut::<f64>();
    if kind == NormKind::Frobenius {
        cell[0] = acc_ssq.scale;
        cell[1] = acc_ssq.ssq;
    } else {
        cell[0] = acc_max;
    }
    Ok(())
}

/// Build a reduction graph over `A` for a `p x q` process grid
///
/// `p` and `q` must match the matrix's grid. The graph owns two internal
/// workspace matrices sized per the kind, registers tile, column-workspace,
/// and grid-cell arenas, and publishes the scalar into `result` from a
/// single task on rank zero.
pub fn norm_graph(
    kind: NormKind,
    p: usize,
    q: usize,
    a: &Arc<TiledMatrix>,
    result: &Arc<ResultCell>,
) -> Result<Graph> {
    let grid = a.grid();
    if p != grid.rows() || q != grid.cols() {
        warn!(
            "process grid {}x{} does not match the matrix grid {}x{}",
            p,
            q,
            grid.rows(),
            grid.cols()
        );
        return Err(Error::invalid_argument(
            "p",
            format!(
                "process grid {p}x{q} does not match the matrix grid {}x{}",
                grid.rows(),
                grid.cols()
            ),
        ));
    }

    let shape = a.shape();
    let col_dims = column_workspace_dims(kind, p, q, &shape);
    let cell_dims = cell_workspace_dims(kind, p, q);
    let wcol = TiledMatrix::zeros(
        ElementType::F64,
        col_dims.rows,
        col_dims.cols,
        col_dims.mb,
        col_dims.nb,
        grid,
    )?;
    let welt = TiledMatrix::zeros(
        ElementType::F64,
        cell_dims.rows,
        cell_dims.cols,
        cell_dims.mb,
        cell_dims.nb,
        grid,
    )?;

    let mut arenas = ArenaSet::new();
    arenas.register(Arena::tile(a.dtype(), a.mb(), a.nb()))?;
    let col_arena = arenas.register(Arena::rectangle(
        ShapeClass::ColWorkspace,
        ElementType::F64,
        col_dims.mb,
        col_dims.nb,
    ))?;
    let elt_arena = arenas.register(Arena::rectangle(
        ShapeClass::CellWorkspace,
        ElementType::F64,
        cell_dims.mb,
        cell_dims.nb,
    ))?;

    let store = Arc::new(PartialStore::new(shape.mt, shape.nt));

    let mut partial_tasks = Vec::new();
    for m in 0..shape.mt {
        for n in 0..shape.nt {
            let a = Arc::clone(a);
            let store = Arc::clone(&store);
            let rank = a.owner_of(m, n);
            partial_tasks.push(Task::new((m, n), rank, move |_ctx| {
                let guard = a.tile(m, n);
                let partial = tile_partial(kind, &guard.view(), a.mb(), a.nb());
                store.set(m, n, partial);
                Ok(())
            }));
        }
    }

    let mut column_tasks = Vec::new();
    if kind == NormKind::One {
        for pp in 0..p {
            for n in 0..shape.nt {
                let store = Arc::clone(&store);
                let wcol = Arc::clone(&wcol);
                let rank = grid.rank_at(pp, grid.col_of(n));
                column_tasks.push(Task::new((pp, n), rank, move |_ctx| {
                    combine_into_row(&store, &wcol, grid, shape.mt, pp, n)
                }));
            }
        }
    } else {
        for m in 0..shape.mt {
            for qq in 0..q {
                let store = Arc::clone(&store);
                let wcol = Arc::clone(&wcol);
                let rank = grid.rank_at(grid.row_of(m), qq);
                column_tasks.push(Task::new((m, qq), rank, move |_ctx| {
                    combine_into_column(kind, &store, &wcol, grid, shape.nt, m, qq)
                }));
            }
        }
    }

    let mut cell_tasks = Vec::new();
    for pp in 0..p {
        for qq in 0..q {
            let wcol = Arc::clone(&wcol);
            let welt = Arc::clone(&welt);
            let col_arena = Arc::clone(&col_arena);
            let rank = grid.rank_at(pp, qq);
            cell_tasks.push(Task::new((pp, qq), rank, move |ctx| {
                combine_into_cell(ctx, kind, &wcol, &welt, &col_arena, grid, shape, pp, qq)
            }));
        }
    }

    let final_task = {
        let welt = Arc::clone(&welt);
        let elt_arena = Arc::clone(&elt_arena);
        let result = Arc::clone(result);
        Task::new((0, 0), 0, move |ctx| {
            if kind == NormKind::Frobenius {
                let mut acc = SumSq::default();
                for pp in 0..p {
                    for qq in 0..q {
                        let fetched = ctx.fetch(&welt, pp, qq, &elt_arena)?;
                        let s = fetched.view().as_slice::<f64>();
                        acc.merge(SumSq { scale: s[0], ssq: s[1] });
                    }
                }
                result.set(acc.value());
            } else {
                let mut best = 0.0f64;
                for pp in 0..p {
                    for qq in 0..q {
                        let fetched = ctx.fetch(&welt, pp, qq, &elt_arena)?;
                        best = best.max(fetched.view().as_slice::<f64>()[0]);
                    }
                }
                result.set(best);
            }
            Ok(())
        })
    };

    Ok(Graph::from_parts(GraphParts {
        layers: vec![
            TaskLayer::new("tile-partials", partial_tasks),
            TaskLayer::new("column-combine", column_tasks),
            TaskLayer::new("cell-combine", cell_tasks),
            TaskLayer::new("final-combine", vec![final_task]),
        ],
        arenas,
        workspaces: vec![wcol, welt],
        pools: vec![],
        args: None,
    }))
}

/// Compute a norm of `A` and block until the scalar is available
pub fn norm<E: Engine>(engine: &E, kind: NormKind, a: &Arc<TiledMatrix>) -> Result<f64> {
    let result = Arc::new(ResultCell::new());
    let grid = a.grid();
    let mut graph = norm_graph(kind, grid.rows(), grid.cols(), a, &result)?;
    engine.enqueue(&mut graph)?;
    engine.run_to_completion()?;
    graph.destroy();
    result
        .get()
        .ok_or_else(|| Error::engine("reduction finished without producing a result"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_3x2() -> MatrixShape {
        MatrixShape {
            dtype: ElementType::F64,
            rows: 70,
            cols: 90,
            mb: 32,
            nb: 48,
            mt: 3,
            nt: 2,
        }
    }

    fn shape_2x5() -> MatrixShape {
        MatrixShape {
            dtype: ElementType::F64,
            rows: 30,
            cols: 37,
            mb: 16,
            nb: 8,
            mt: 2,
            nt: 5,
        }
    }

    #[test]
    fn test_from_raw_falls_back_to_max() {
        assert_eq!(NormKind::from_raw(3), NormKind::Frobenius);
        assert_eq!(NormKind::from_raw(7), NormKind::Max);
        assert_eq!(NormKind::from_raw(-1), NormKind::Max);
    }

    #[test]
    fn test_column_workspace_sizing() {
        let shape = shape_3x2();
        assert_eq!(
            column_workspace_dims(NormKind::Max, 2, 3, &shape),
            WorkspaceDims { mb: 1, nb: 1, rows: 3, cols: 3 }
        );
        assert_eq!(
            column_workspace_dims(NormKind::Inf, 2, 3, &shape),
            WorkspaceDims { mb: 32, nb: 1, rows: 96, cols: 3 }
        );
        // q exceeds nt, so the one-norm workspace widens to q tile columns
        assert_eq!(
            column_workspace_dims(NormKind::One, 2, 3, &shape),
            WorkspaceDims { mb: 1, nb: 48, rows: 2, cols: 144 }
        );
        assert_eq!(
            column_workspace_dims(NormKind::Frobenius, 2, 3, &shape),
            WorkspaceDims { mb: 2, nb: 1, rows: 6, cols: 3 }
        );

        // nt exceeds q here, so the one-norm keeps all five tile columns
        let shape = shape_2x5();
        assert_eq!(
            column_workspace_dims(NormKind::Max, 3, 2, &shape),
            WorkspaceDims { mb: 1, nb: 1, rows: 2, cols: 2 }
        );
        assert_eq!(
            column_workspace_dims(NormKind::Inf, 3, 2, &shape),
            WorkspaceDims { mb: 16, nb: 1, rows: 32, cols: 2 }
        );
        assert_eq!(
            column_workspace_dims(NormKind::One, 3, 2, &shape),
            WorkspaceDims { mb: 1, nb: 8, rows: 3, cols: 40 }
        );
        assert_eq!(
            column_workspace_dims(NormKind::Frobenius, 3, 2, &shape),
            WorkspaceDims { mb: 2, nb: 1, rows: 4, cols: 2 }
        );
    }

    #[test]
    fn test_cell_workspace_sizing() {
        assert_eq!(
            cell_workspace_dims(NormKind::Max, 2, 3),
            WorkspaceDims { mb: 1, nb: 1, rows: 2, cols: 3 }
        );
        assert_eq!(
            cell_workspace_dims(NormKind::Frobenius, 2, 3),
            WorkspaceDims { mb: 2, nb: 1, rows: 4, cols: 3 }
        );
        // cell rows follow the grid's p on a taller-than-wide grid
        assert_eq!(
            cell_workspace_dims(NormKind::Max, 3, 2),
            WorkspaceDims { mb: 1, nb: 1, rows: 3, cols: 2 }
        );
        assert_eq!(
            cell_workspace_dims(NormKind::Frobenius, 3, 2),
            WorkspaceDims { mb: 2, nb: 1, rows: 6, cols: 2 }
        );
    }

    #[test]
    fn test_sumsq_matches_plain_sum() {
        let mut acc = SumSq::default();
        acc.add(3.0);
        acc.add(-4.0);
        assert!((acc.value() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_sumsq_survives_large_magnitudes() {
        let mut acc = SumSq::default();
        acc.add(1e200);
        acc.add(1e200);
        let expected = 1e200 * 2.0f64.sqrt();
        assert!((acc.value() - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_sumsq_merge_neutral() {
        let mut acc = SumSq::default();
        let mut other = SumSq::default();
        other.add(2.0);
        acc.merge(other);
        assert_eq!(acc, other);
        acc.merge(SumSq::default());
        assert_eq!(acc, other);
    }

    #[test]
    fn test_result_cell_is_write_once() {
        let cell = ResultCell::new();
        assert_eq!(cell.get(), None);
        cell.set(4.5);
        cell.set(9.9);
        assert_eq!(cell.get(), Some(4.5));
    }

    #[test]
    fn test_tile_partial_row_and_column_sums() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(2, 3, 2, 3, grid, |i, j| {
            if i == 0 { (j + 1) as f64 } else { -1.0 }
        })
        .unwrap();
        let guard = a.tile(0, 0);

        let inf = tile_partial(NormKind::Inf, &guard.view(), 2, 3);
        assert_eq!(inf.as_ref(), &[6.0, 3.0]);

        let one = tile_partial(NormKind::One, &guard.view(), 2, 3);
        assert_eq!(one.as_ref(), &[2.0, 3.0, 4.0]);

        let max = tile_partial(NormKind::Max, &guard.view(), 2, 3);
        assert_eq!(max.as_ref(), &[3.0]);
    }
}
