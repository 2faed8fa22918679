//! Task graphs and the resources they own
//!
//! A [`Graph`] is a fully-described computation: staged task layers plus
//! every resource those tasks touch that is not caller-owned (arenas,
//! internal workspace matrices, scratch pools, and the retained operator
//! argument blob). Builders in [`crate::ops`] produce graphs; an
//! [`crate::engine::Engine`] consumes them.
//!
//! Lifecycle is linear: `Built -> Enqueued -> Completed -> Destroyed`.
//! [`Graph::destroy`] releases all owned resources and is idempotent;
//! dropping a graph destroys it.

mod arena;
mod pool;
mod task;

pub use arena::{Arena, ArenaSet, ShapeClass};
pub use pool::{PoolChunk, ScratchPool};
pub use task::TaskContext;

pub(crate) use task::{ExecPlan, Task, TaskLayer};

use crate::error::{Error, Result};
use crate::matrix::{MatrixShape, TiledMatrix};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Lifecycle state of a graph
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GraphState {
    /// Built and ready to be enqueued
    Built = 0,
    /// Handed to an engine, not yet finished
    Enqueued = 1,
    /// All tasks have run
    Completed = 2,
    /// Resources released; the handle is inert
    Destroyed = 3,
}

impl GraphState {
    fn from_u8(v: u8) -> GraphState {
        match v {
            0 => GraphState::Built,
            1 => GraphState::Enqueued,
            2 => GraphState::Completed,
            _ => GraphState::Destroyed,
        }
    }

    /// Lower-case state name for messages
    pub fn name(self) -> &'static str {
        match self {
            GraphState::Built => "built",
            GraphState::Enqueued => "enqueued",
            GraphState::Completed => "completed",
            GraphState::Destroyed => "destroyed",
        }
    }
}

/// Shared lifecycle cell; the engine flips it to `Completed`
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: GraphState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> GraphState {
        GraphState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: GraphState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Flip `Enqueued` to `Completed`; a graph destroyed early stays destroyed
    pub(crate) fn complete(&self) {
        let _ = self.0.compare_exchange(
            GraphState::Enqueued as u8,
            GraphState::Completed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn transition(&self, from: GraphState, to: GraphState) -> Result<()> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|found| Error::GraphLifecycle {
                expected: from.name(),
                found: GraphState::from_u8(found).name(),
            })
    }
}

/// Everything a builder hands over to assemble a graph
pub(crate) struct GraphParts {
    pub layers: Vec<TaskLayer>,
    pub arenas: ArenaSet,
    pub workspaces: Vec<Arc<TiledMatrix>>,
    pub pools: Vec<Arc<ScratchPool>>,
    pub args: Option<Arc<dyn Any + Send + Sync>>,
}

/// A built computation and the resources it owns
pub struct Graph {
    plan: Option<Arc<ExecPlan>>,
    state: Arc<StateCell>,
    arenas: Option<ArenaSet>,
    workspaces: Vec<Arc<TiledMatrix>>,
    pools: Vec<Arc<ScratchPool>>,
    args: Option<Arc<dyn Any + Send + Sync>>,
}

impl Graph {
    pub(crate) fn from_parts(parts: GraphParts) -> Self {
        let plan = Arc::new(ExecPlan::new(parts.layers));
        debug!(
            layers = plan.layers().len(),
            tasks = plan.task_count(),
            "graph built"
        );
        Self {
            plan: Some(plan),
            state: Arc::new(StateCell::new(GraphState::Built)),
            arenas: Some(parts.arenas),
            workspaces: parts.workspaces,
            pools: parts.pools,
            args: parts.args,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> GraphState {
        self.state.load()
    }

    /// Total scheduled task count across all layers
    pub fn task_count(&self) -> usize {
        self.plan.as_ref().map_or(0, |p| p.task_count())
    }

    /// Number of staged layers
    pub fn layer_count(&self) -> usize {
        self.plan.as_ref().map_or(0, |p| p.layers().len())
    }

    /// Coordinates scheduled in one layer, for structural inspection
    pub fn layer_coords(&self, layer: usize) -> Vec<(usize, usize)> {
        self.plan
            .as_ref()
            .and_then(|p| p.layers().get(layer))
            .map_or_else(Vec::new, |l| l.tasks().iter().map(Task::coord).collect())
    }

    /// Arena registered for a shape class, if the graph is still live
    pub fn arena(&self, class: ShapeClass) -> Option<&Arc<Arena>> {
        self.arenas.as_ref().and_then(|set| set.get(class))
    }

    /// Number of live arenas; zero once destroyed
    pub fn arena_count(&self) -> usize {
        self.arenas.as_ref().map_or(0, ArenaSet::len)
    }

    /// Shapes of the internal workspace matrices, in registration order
    pub fn workspace_shapes(&self) -> Vec<MatrixShape> {
        self.workspaces.iter().map(|w| w.shape()).collect()
    }

    /// Chunk sizes of the scratch pools, in registration order
    pub fn pool_chunk_sizes(&self) -> Vec<usize> {
        self.pools.iter().map(|p| p.chunk_bytes()).collect()
    }

    /// Units packed for cross-rank movement through one shape class
    pub fn transfer_count(&self, class: ShapeClass) -> Option<usize> {
        self.arena(class).map(|a| a.packed_units())
    }

    /// Begin the `Built -> Enqueued` handoff; engines call this
    pub(crate) fn begin_enqueue(&mut self) -> Result<(Arc<ExecPlan>, Arc<StateCell>)> {
        self.state.transition(GraphState::Built, GraphState::Enqueued)?;
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| Error::engine("graph has no executable plan"))?;
        Ok((plan, Arc::clone(&self.state)))
    }

    /// Release every resource the graph owns
    ///
    /// Safe to call any number of times; after the first call the handle is
    /// inert and reports zero arenas, workspaces, and pools. Tasks already
    /// handed to an engine keep their own references and are unaffected.
    pub fn destroy(&mut self) {
        if self.state.load() == GraphState::Destroyed {
            return;
        }
        debug!(state = self.state.load().name(), "graph destroyed");
        self.state.store(GraphState::Destroyed);
        self.plan = None;
        self.arenas = None;
        self.workspaces.clear();
        self.pools.clear();
        self.args = None;
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("state", &self.state())
            .field("tasks", &self.task_count())
            .field("layers", &self.layer_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ElementType;

    fn empty_graph() -> Graph {
        Graph::from_parts(GraphParts {
            layers: vec![TaskLayer::new("noop", vec![Task::new((0, 0), 0, |_| Ok(()))])],
            arenas: {
                let mut set = ArenaSet::new();
                set.register(Arena::tile(ElementType::F64, 2, 2)).unwrap();
                set
            },
            workspaces: vec![],
            pools: vec![Arc::new(ScratchPool::new(128))],
            args: None,
        })
    }

    #[test]
    fn test_new_graph_is_built() {
        let g = empty_graph();
        assert_eq!(g.state(), GraphState::Built);
        assert_eq!(g.task_count(), 1);
        assert_eq!(g.arena_count(), 1);
        assert_eq!(g.pool_chunk_sizes(), vec![128]);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut g = empty_graph();
        g.destroy();
        assert_eq!(g.state(), GraphState::Destroyed);
        assert_eq!(g.arena_count(), 0);
        assert_eq!(g.task_count(), 0);
        assert!(g.pool_chunk_sizes().is_empty());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut g = empty_graph();
        g.destroy();
        g.destroy();
        g.destroy();
        assert_eq!(g.state(), GraphState::Destroyed);
    }

    #[test]
    fn test_enqueue_twice_is_a_lifecycle_error() {
        let mut g = empty_graph();
        g.begin_enqueue().unwrap();
        let err = g.begin_enqueue().unwrap_err();
        assert!(matches!(err, Error::GraphLifecycle { expected: "built", found: "enqueued" }));
    }

    #[test]
    fn test_enqueue_after_destroy_fails() {
        let mut g = empty_graph();
        g.destroy();
        assert!(g.begin_enqueue().is_err());
    }

    #[test]
    fn test_layer_coords_reports_schedule() {
        let g = empty_graph();
        assert_eq!(g.layer_coords(0), vec![(0, 0)]);
        assert!(g.layer_coords(7).is_empty());
    }
}
