//! Execution engine boundary
//!
//! An [`Engine`] accepts built graphs, runs their task layers in order, and
//! combines per-process status codes. The trait is the seam a distributed
//! runtime would implement; [`LocalEngine`] runs everything in one address
//! space and is the engine used by the blocking helpers in [`crate::ops`].

mod local;

pub use local::LocalEngine;

use crate::error::Result;
use crate::graph::Graph;

/// Accepts and runs task graphs
pub trait Engine: Send + Sync {
    /// Hand a built graph to the engine
    ///
    /// Moves the graph from `Built` to `Enqueued`; a graph in any other
    /// state is rejected with a lifecycle error. The caller keeps the
    /// handle and destroys it after completion.
    fn enqueue(&self, graph: &mut Graph) -> Result<()>;

    /// Run every enqueued graph to completion, layer by layer
    ///
    /// Returns the first task error, if any. Graphs that complete flip to
    /// `Completed`.
    fn run_to_completion(&self) -> Result<()>;

    /// Combine a per-process status code across all participating processes
    ///
    /// The result is the maximum of every process's `value`, delivered to
    /// every process.
    fn allreduce_max(&self, value: i32) -> i32;
}
