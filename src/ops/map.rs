//! Unary per-tile operator graphs

use crate::engine::Engine;
use crate::error::Result;
use crate::graph::{Arena, ArenaSet, Graph, GraphParts, Task, TaskLayer};
use crate::matrix::TiledMatrix;
use crate::ops::{OpArgs, Region, UnaryTileOp};
use std::sync::Arc;

/// Build a graph applying `op` in place to every region tile of `A`
///
/// One invocation per region tile, on the owning rank, so no tile ever
/// crosses a process boundary. The tile arena is still registered because
/// the graph describes the movable shape regardless of whether a particular
/// schedule moves it.
pub fn map_graph(
    region: Region,
    a: &Arc<TiledMatrix>,
    op: UnaryTileOp,
    args: OpArgs,
) -> Result<Graph> {
    let mut arenas = ArenaSet::new();
    arenas.register(Arena::tile(a.dtype(), a.mb(), a.nb()))?;

    let mut tasks = Vec::new();
    for m in 0..a.mt() {
        for n in 0..a.nt() {
            if !region.contains(m, n) {
                continue;
            }
            let a = Arc::clone(a);
            let op = op.clone();
            let args = args.clone();
            let rank = a.owner_of(m, n);
            tasks.push(Task::new((m, n), rank, move |ctx| {
                let mut guard = a.tile_mut(m, n);
                let mut view = guard.view_mut();
                op(ctx, &mut view, args.as_ref(), region, m, n);
                Ok(())
            }));
        }
    }

    Ok(Graph::from_parts(GraphParts {
        layers: vec![TaskLayer::new("map", tasks)],
        arenas,
        workspaces: vec![],
        pools: vec![],
        args: Some(args),
    }))
}

/// Apply `op` in place over the region and block until done
pub fn map<E: Engine>(
    engine: &E,
    region: Region,
    a: &Arc<TiledMatrix>,
    op: UnaryTileOp,
    args: OpArgs,
) -> Result<()> {
    let mut graph = map_graph(region, a, op, args)?;
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
    use crate::ops::{ScaleArgs, scale_operator};

    #[test]
    fn test_upper_region_schedules_upper_tiles_only() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let a = TiledMatrix::from_fn(6, 6, 2, 2, grid, |_, _| 1.0f64).unwrap();

        let graph = map_graph(Region::Upper, &a, scale_operator(), Arc::new(())).unwrap();
        let coords = graph.layer_coords(0);
        assert_eq!(coords.len(), 6);
        assert!(coords.iter().all(|&(m, n)| n >= m));
    }

    #[test]
    fn test_blocking_map_scales_in_place() {
        let grid = ProcessGrid::new(2, 1).unwrap();
        let a = TiledMatrix::from_fn(4, 4, 2, 2, grid, |i, j| (i * 4 + j) as f64).unwrap();

        let engine = LocalEngine::new();
        let args = Arc::new(ScaleArgs { alpha: -1.0 });
        map(&engine, Region::Full, &a, scale_operator(), args).unwrap();

        let dense = a.to_dense::<f64>().unwrap();
        assert_eq!(dense[5], -5.0);
        assert_eq!(dense[0], 0.0);
    }
}
