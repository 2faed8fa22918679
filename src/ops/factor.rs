//! Panel factorization sweep graphs
//!
//! A sweep visits every diagonal tile in order, one task per step, on the
//! rank owning that tile. The kernel for each step gets two scratch chunks
//! from graph-owned pools sized by the classic panel and update workspace
//! formulas. Kernel status codes accumulate by maximum into a caller-owned
//! [`StatusCell`]; the blocking wrapper folds that local status across
//! processes with [`Engine::allreduce_max`].

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graph::{Arena, ArenaSet, Graph, GraphParts, ScratchPool, Task, TaskLayer};
use crate::matrix::TiledMatrix;
use crate::ops::PanelOp;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::warn;

/// Per-process factorization status, merged by maximum
///
/// Zero means every step succeeded; a positive value is the largest status
/// any kernel reported. Caller-owned, so it survives graph destruction.
#[derive(Default)]
pub struct StatusCell {
    info: AtomicI32,
}

impl StatusCell {
    /// Cell reporting success until a kernel says otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Current merged status
    pub fn get(&self) -> i32 {
        self.info.load(Ordering::Acquire)
    }

    fn merge_max(&self, status: i32) {
        self.info.fetch_max(status, Ordering::AcqRel);
    }
}

/// Bytes for one panel scratch chunk: `(ib + 1) * nb` elements
#[inline]
pub fn panel_chunk_bytes(ib: usize, nb: usize, elem_bytes: usize) -> usize {
    (ib + 1) * nb * elem_bytes
}

/// Bytes for one update scratch chunk: `(mb + 1) * nb + ib^2` elements
#[inline]
pub fn update_chunk_bytes(ib: usize, mb: usize, nb: usize, elem_bytes: usize) -> usize {
    ((mb + 1) * nb + ib * ib) * elem_bytes
}

/// Build a factorization sweep over the diagonal tiles of `A`
///
/// `ib` is the inner blocking factor the scratch formulas are sized with.
/// Each diagonal step runs in its own layer, preserving sweep order. The
/// kernel's nonzero status codes merge into `status` by maximum.
pub fn factor_graph(
    a: &Arc<TiledMatrix>,
    ib: usize,
    kernel: PanelOp,
    status: &Arc<StatusCell>,
) -> Result<Graph> {
    if ib == 0 {
        warn!("inner blocking factor must be at least 1");
        return Err(Error::invalid_argument("ib", "inner blocking factor must be at least 1"));
    }

    let elem_bytes = a.dtype().size_in_bytes();
    let panel_pool = Arc::new(ScratchPool::new(panel_chunk_bytes(ib, a.nb(), elem_bytes)));
    let update_pool = Arc::new(ScratchPool::new(update_chunk_bytes(
        ib,
        a.mb(),
        a.nb(),
        elem_bytes,
    )));

    let mut arenas = ArenaSet::new();
    arenas.register(Arena::tile(a.dtype(), a.mb(), a.nb()))?;

    let steps = a.mt().min(a.nt());
    let mut layers = Vec::with_capacity(steps);
    for k in 0..steps {
        let a = Arc::clone(a);
        let kernel = kernel.clone();
        let status = Arc::clone(status);
        let panel_pool = Arc::clone(&panel_pool);
        let update_pool = Arc::clone(&update_pool);
        let rank = a.owner_of(k, k);
        let task = Task::new((k, k), rank, move |ctx| {
            let mut panel = panel_pool.acquire()?;
            let mut update = update_pool.acquire()?;
            let mut guard = a.tile_mut(k, k);
            let mut tile = guard.view_mut();
            let info = kernel(ctx, &mut tile, panel.bytes_mut(), update.bytes_mut(), k);
            if info != 0 {
                status.merge_max(info);
            }
            Ok(())
        });
        layers.push(TaskLayer::new("panel", vec![task]));
    }

    Ok(Graph::from_parts(GraphParts {
        layers,
        arenas,
        workspaces: vec![],
        pools: vec![panel_pool, update_pool],
        args: None,
    }))
}

/// Run a factorization sweep and block until the global status is known
///
/// Returns the maximum status across every participating process.
pub fn factor<E: Engine>(
    engine: &E,
    a: &Arc<TiledMatrix>,
    ib: usize,
    kernel: PanelOp,
) -> Result<i32> {
    let status = Arc::new(StatusCell::new());
    let mut graph = factor_graph(a, ib, kernel, &status)?;
    engine.enqueue(&mut graph)?;
    engine.run_to_completion()?;
    graph.destroy();
    Ok(engine.allreduce_max(status.get()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::grid::ProcessGrid;

    fn noop_kernel() -> PanelOp {
        Arc::new(|_ctx, _tile, _panel, _update, _k| 0)
    }

    #[test]
    fn test_chunk_formulas() {
        assert_eq!(panel_chunk_bytes(4, 8, 8), 5 * 8 * 8);
        assert_eq!(update_chunk_bytes(4, 8, 8, 8), (9 * 8 + 16) * 8);
    }

    #[test]
    fn test_zero_ib_rejected() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(4, 4, 2, 2, grid, |_, _| 1.0f64).unwrap();
        let status = Arc::new(StatusCell::new());
        assert!(factor_graph(&a, 0, noop_kernel(), &status).is_err());
    }

    #[test]
    fn test_one_layer_per_diagonal_step() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        let a = TiledMatrix::from_fn(8, 6, 2, 2, grid, |_, _| 1.0f64).unwrap();
        let status = Arc::new(StatusCell::new());

        let graph = factor_graph(&a, 2, noop_kernel(), &status).unwrap();
        assert_eq!(graph.layer_count(), 3);
        assert_eq!(graph.pool_chunk_sizes(), vec![
            panel_chunk_bytes(2, 2, 8),
            update_chunk_bytes(2, 2, 2, 8),
        ]);
        assert_eq!(graph.layer_coords(1), vec![(1, 1)]);
    }

    #[test]
    fn test_status_merges_by_max() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(6, 6, 2, 2, grid, |_, _| 1.0f64).unwrap();

        // report step + 1 from every step; the sweep keeps the largest
        let kernel: PanelOp = Arc::new(|_ctx, _tile, _panel, _update, k| (k as i32) + 1);
        let engine = LocalEngine::new();
        let info = factor(&engine, &a, 2, kernel).unwrap();
        assert_eq!(info, 3);
    }

    #[test]
    fn test_kernel_sees_scratch_of_the_right_size() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(4, 4, 4, 4, grid, |_, _| 1.0f64).unwrap();

        let kernel: PanelOp = Arc::new(|_ctx, tile, panel, update, _k| {
            if tile.rows() != 4 || tile.cols() != 4 {
                return 1;
            }
            if panel.len() != panel_chunk_bytes(2, 4, 8) {
                return 2;
            }
            if update.len() != update_chunk_bytes(2, 4, 4, 8) {
                return 3;
            }
            0
        });
        let engine = LocalEngine::new();
        assert_eq!(factor(&engine, &a, 2, kernel).unwrap(), 0);
    }
}
