//! Tasks and staged execution layers
//!
//! A graph's work is a sequence of [`TaskLayer`]s. Every task in a layer may
//! run concurrently; a layer does not start until the previous layer has
//! finished. This makes each builder's data-flow explicit: a stage that reads
//! another stage's output simply lives in a later layer.

use crate::error::Result;
use crate::graph::arena::{Arena, PackedTile};
use crate::matrix::{TileGuard, TileView, TiledMatrix};
use std::fmt;

type TaskFn = Box<dyn Fn(&TaskContext) -> Result<()> + Send + Sync>;

/// One schedulable unit of work, pinned to a rank
pub(crate) struct Task {
    coord: (usize, usize),
    rank: usize,
    run: TaskFn,
}

impl Task {
    pub(crate) fn new(
        coord: (usize, usize),
        rank: usize,
        run: impl Fn(&TaskContext) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self { coord, rank, run: Box::new(run) }
    }

    /// Tile or stage coordinate this task operates on
    pub(crate) fn coord(&self) -> (usize, usize) {
        self.coord
    }

    /// Rank the task is pinned to
    pub(crate) fn rank(&self) -> usize {
        self.rank
    }

    pub(crate) fn execute(&self, ctx: &TaskContext) -> Result<()> {
        (self.run)(ctx)
    }
}

/// A named batch of tasks with no ordering constraints among them
pub(crate) struct TaskLayer {
    name: &'static str,
    tasks: Vec<Task>,
}

impl TaskLayer {
    pub(crate) fn new(name: &'static str, tasks: Vec<Task>) -> Self {
        Self { name, tasks }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Fully-built schedule of a graph: layers run in order
pub(crate) struct ExecPlan {
    layers: Vec<TaskLayer>,
}

impl ExecPlan {
    pub(crate) fn new(layers: Vec<TaskLayer>) -> Self {
        Self { layers }
    }

    pub(crate) fn layers(&self) -> &[TaskLayer] {
        &self.layers
    }

    pub(crate) fn task_count(&self) -> usize {
        self.layers.iter().map(TaskLayer::len).sum()
    }
}

impl fmt::Debug for ExecPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecPlan")
            .field("layers", &self.layers.len())
            .field("tasks", &self.task_count())
            .finish()
    }
}

/// Per-invocation execution context handed to every task and operator
pub struct TaskContext {
    rank: usize,
}

impl TaskContext {
    pub(crate) fn new(rank: usize) -> Self {
        Self { rank }
    }

    /// Rank this task runs on
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Read a tile, packing it through `arena` when it lives on another rank
    ///
    /// Locally-owned tiles are read in place; remote tiles are copied into a
    /// transfer buffer, which counts against the arena's packed-unit total.
    pub(crate) fn fetch<'m>(
        &self,
        mat: &'m TiledMatrix,
        m: usize,
        n: usize,
        arena: &Arena,
    ) -> Result<FetchedTile<'m>> {
        if mat.owner_of(m, n) == self.rank {
            Ok(FetchedTile::Local(mat.tile(m, n)))
        } else {
            let guard = mat.tile(m, n);
            let packed = arena.pack(&guard.view())?;
            Ok(FetchedTile::Transferred(packed))
        }
    }
}

/// A tile obtained by a task: in place or via a transfer buffer
pub(crate) enum FetchedTile<'m> {
    Local(TileGuard<'m>),
    Transferred(PackedTile),
}

impl FetchedTile<'_> {
    pub(crate) fn view(&self) -> TileView<'_> {
        match self {
            FetchedTile::Local(guard) => guard.view(),
            FetchedTile::Transferred(packed) => packed.view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ElementType;
    use crate::grid::ProcessGrid;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_task_runs_with_its_rank() {
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen2 = Arc::clone(&seen);
        let task = Task::new((2, 3), 5, move |ctx| {
            seen2.store(ctx.rank(), Ordering::Relaxed);
            Ok(())
        });
        assert_eq!(task.coord(), (2, 3));
        assert_eq!(task.rank(), 5);
        task.execute(&TaskContext::new(task.rank())).unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_plan_counts_tasks_across_layers() {
        let l1 = TaskLayer::new("a", vec![Task::new((0, 0), 0, |_| Ok(()))]);
        let l2 = TaskLayer::new("b", vec![
            Task::new((0, 0), 0, |_| Ok(())),
            Task::new((0, 1), 0, |_| Ok(())),
        ]);
        let plan = ExecPlan::new(vec![l1, l2]);
        assert_eq!(plan.task_count(), 3);
        assert_eq!(plan.layers()[0].name(), "a");
    }

    #[test]
    fn test_fetch_local_does_not_pack() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        let a = TiledMatrix::from_fn(8, 8, 4, 4, grid, |i, j| (i + j) as f64).unwrap();
        let arena = Arena::tile(ElementType::F64, 4, 4);

        // tile (1, 0) is owned by rank 2 on a 2x2 grid
        let ctx = TaskContext::new(2);
        let fetched = ctx.fetch(&a, 1, 0, &arena).unwrap();
        assert!(matches!(fetched, FetchedTile::Local(_)));
        assert_eq!(arena.packed_units(), 0);
    }

    #[test]
    fn test_fetch_remote_packs_through_arena() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        let a = TiledMatrix::from_fn(8, 8, 4, 4, grid, |i, j| (i * 8 + j) as f64).unwrap();
        let arena = Arena::tile(ElementType::F64, 4, 4);

        let ctx = TaskContext::new(0);
        let fetched = ctx.fetch(&a, 1, 1, &arena).unwrap();
        assert!(matches!(fetched, FetchedTile::Transferred(_)));
        assert_eq!(arena.packed_units(), 1);

        // the packed copy carries the same data
        let view = fetched.view();
        assert_eq!(view.as_slice::<f64>()[0], (4 * 8 + 4) as f64);
    }
}
