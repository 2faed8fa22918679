//! Single-address-space engine

use crate::engine::Engine;
use crate::error::Result;
use crate::graph::{ExecPlan, Graph, StateCell, TaskContext, TaskLayer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Engine that runs all ranks of a graph in the current process
///
/// Tasks inside a layer run in parallel when the `rayon` feature is enabled
/// (the default) and serially otherwise; layers always run in order. Rank
/// pinning still holds: every task executes with the rank it was scheduled
/// for, so owner-compute and transfer accounting behave as they would under
/// a distributed engine.
#[derive(Default)]
pub struct LocalEngine {
    queue: Mutex<VecDeque<(Arc<ExecPlan>, Arc<StateCell>)>>,
}

impl LocalEngine {
    /// New engine with an empty queue
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for LocalEngine {
    fn enqueue(&self, graph: &mut Graph) -> Result<()> {
        let entry = graph.begin_enqueue()?;
        debug!(tasks = entry.0.task_count(), "graph enqueued");
        self.queue.lock().push_back(entry);
        Ok(())
    }

    fn run_to_completion(&self) -> Result<()> {
        loop {
            let next = self.queue.lock().pop_front();
            let Some((plan, state)) = next else {
                return Ok(());
            };
            for layer in plan.layers() {
                debug!(layer = layer.name(), tasks = layer.len(), "running layer");
                run_layer(layer)?;
            }
            state.complete();
        }
    }

    fn allreduce_max(&self, value: i32) -> i32 {
        // one participating process
        value
    }
}

#[cfg(feature = "rayon")]
fn run_layer(layer: &TaskLayer) -> Result<()> {
    layer
        .tasks()
        .par_iter()
        .try_for_each(|task| task.execute(&TaskContext::new(task.rank())))
}

#[cfg(not(feature = "rayon"))]
fn run_layer(layer: &TaskLayer) -> Result<()> {
    layer
        .tasks()
        .iter()
        .try_for_each(|task| task.execute(&TaskContext::new(task.rank())))
}
