//! Error types for tilr

use thiserror::Error;

/// Result type alias using tilr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running tile graphs
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument provided to a builder or constructor
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Workspace or transfer-buffer allocation failed
    #[error("Allocation failure: failed to allocate {size} bytes")]
    AllocationFailure {
        /// Requested size in bytes
        size: usize,
    },

    /// Operation applied to a graph in the wrong lifecycle state
    #[error("Graph is {found}, expected {expected}")]
    GraphLifecycle {
        /// State the operation requires
        expected: &'static str,
        /// State the graph is actually in
        found: &'static str,
    },

    /// The execution engine reported a task failure
    #[error("Engine failure: {0}")]
    EngineFailure(String),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an engine-failure error
    pub fn engine(reason: impl Into<String>) -> Self {
        Self::EngineFailure(reason.into())
    }
}
