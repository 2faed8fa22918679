//! Binary per-tile operator graphs

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graph::{Arena, ArenaSet, Graph, GraphParts, Task, TaskLayer};
use crate::matrix::TiledMatrix;
use crate::ops::{BinaryTileOp, OpArgs, Region};
use std::sync::Arc;
use tracing::warn;

/// Build a graph applying `op` to every region tile pair of `A` and `B`
///
/// Exactly one invocation is scheduled per tile coordinate inside `region`,
/// on the rank that owns the `B` tile. `A` is read-only; when its tile lives
/// on another rank it is packed through the graph's tile arena. The argument
/// blob is retained by the graph until destruction.
///
/// `A` and `B` must be distinct matrices with matching tile grids and
/// element type.
pub fn map2_graph(
    region: Region,
    a: &Arc<TiledMatrix>,
    b: &Arc<TiledMatrix>,
    op: BinaryTileOp,
    args: OpArgs,
) -> Result<Graph> {
    if Arc::ptr_eq(a, b) {
        warn!("map2 input and output alias the same matrix");
        return Err(Error::invalid_argument(
            "b",
            "aliases a; the read side and the write side must be distinct matrices",
        ));
    }
    if a.mt() != b.mt() || a.nt() != b.nt() {
        warn!(
            "tile grids do not match: a is {}x{}, b is {}x{}",
            a.mt(),
            a.nt(),
            b.mt(),
            b.nt()
        );
        return Err(Error::invalid_argument(
            "b",
            format!(
                "tile grid {}x{} does not match a ({}x{})",
                b.mt(),
                b.nt(),
                a.mt(),
                a.nt()
            ),
        ));
    }
    if a.dtype() != b.dtype() {
        warn!(
            "element types do not match: a is {}, b is {}",
            a.dtype(),
            b.dtype()
        );
        return Err(Error::invalid_argument(
            "b",
            format!("element type {} does not match a ({})", b.dtype(), a.dtype()),
        ));
    }

    let mut arenas = ArenaSet::new();
    let tile_arena = arenas.register(Arena::tile(a.dtype(), a.mb(), a.nb()))?;

    let mut tasks = Vec::new();
    for m in 0..b.mt() {
        for n in 0..b.nt() {
            if !region.contains(m, n) {
                continue;
            }
            let a = Arc::clone(a);
            let b = Arc::clone(b);
            let op = op.clone();
            let args = args.clone();
            let arena = Arc::clone(&tile_arena);
            let rank = b.owner_of(m, n);
            tasks.push(Task::new((m, n), rank, move |ctx| {
                let fetched = ctx.fetch(&a, m, n, &arena)?;
                let mut guard = b.tile_mut(m, n);
                let mut out = guard.view_mut();
                op(ctx, &fetched.view(), &mut out, args.as_ref(), region, m, n);
                Ok(())
            }));
        }
    }

    Ok(Graph::from_parts(GraphParts {
        layers: vec![TaskLayer::new("map2", tasks)],
        arenas,
        workspaces: vec![],
        pools: vec![],
        args: Some(args),
    }))
}

/// Apply `op` over the region and block until done
pub fn map2<E: Engine>(
    engine: &E,
    region: Region,
    a: &Arc<TiledMatrix>,
    b: &Arc<TiledMatrix>,
    op: BinaryTileOp,
    args: OpArgs,
) -> Result<()> {
    let mut graph = map2_graph(region, a, b, op, args)?;
    engine.enqueue(&mut graph)?;
    engine.run_to_completion()?;
    graph.destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::grid::ProcessGrid;
    use crate::ops::copy_operator;

    #[test]
    fn test_mismatched_tile_grids_rejected() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(8, 8, 2, 2, grid, |_, _| 0.0f64).unwrap();
        let b = TiledMatrix::from_fn(8, 8, 4, 4, grid, |_, _| 0.0f64).unwrap();

        let err = map2_graph(Region::Full, &a, &b, copy_operator(), Arc::new(())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "b", .. }));
    }

    #[test]
    fn test_mismatched_element_types_rejected() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(8, 8, 2, 2, grid, |_, _| 0.0f64).unwrap();
        let b = TiledMatrix::from_fn(8, 8, 2, 2, grid, |_, _| 0.0f32).unwrap();

        let err = map2_graph(Region::Full, &a, &b, copy_operator(), Arc::new(())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "b", .. }));
    }

    #[test]
    fn test_aliased_operands_rejected() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(4, 4, 2, 2, grid, |_, _| 1.0f64).unwrap();

        let err = map2_graph(Region::Full, &a, &a, copy_operator(), Arc::new(())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "b", .. }));
    }

    #[test]
    fn test_full_region_schedules_every_tile() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        let a = TiledMatrix::from_fn(6, 6, 2, 2, grid, |i, j| (i + j) as f64).unwrap();
        let b = TiledMatrix::from_fn(6, 6, 2, 2, grid, |_, _| 0.0f64).unwrap();

        let graph = map2_graph(Region::Full, &a, &b, copy_operator(), Arc::new(())).unwrap();
        assert_eq!(graph.task_count(), 9);
    }

    #[test]
    fn test_blocking_map2_copies() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(5, 4, 2, 2, grid, |i, j| (10 * i + j) as f64).unwrap();
        let b = TiledMatrix::from_fn(5, 4, 2, 2, grid, |_, _| 0.0f64).unwrap();

        let engine = LocalEngine::new();
        map2(&engine, Region::Full, &a, &b, copy_operator(), Arc::new(())).unwrap();

        assert_eq!(a.to_dense::<f64>().unwrap(), b.to_dense::<f64>().unwrap());
    }
}
