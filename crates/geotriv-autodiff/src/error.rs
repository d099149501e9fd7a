//! Errors raised while building or differentiating a computation graph.

use crate::graph::NodeId;
use geotriv_core::TrivializationError;
use thiserror::Error;

/// Errors that can occur during a forward or backward pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutodiffError {
    /// A node id does not belong to the graph.
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// A leaf node was evaluated before a value was assigned to it.
    #[error("Node {0} has no value")]
    MissingValue(NodeId),

    /// An operation received the wrong number of inputs.
    #[error("{op} expects {expected} inputs, got {actual}")]
    Arity {
        /// Name of the operation
        op: String,
        /// Number of inputs the operation takes
        expected: usize,
        /// Number of inputs it received
        actual: usize,
    },

    /// A scalar was required, e.g. as the output of a loss.
    #[error("Expected a scalar, got shape {shape}")]
    NotScalar {
        /// Shape of the offending tensor
        shape: String,
    },

    /// A manifold or tensor operation failed.
    #[error(transparent)]
    Trivialization(#[from] TrivializationError),
}

impl AutodiffError {
    /// Create an `Arity` error.
    pub fn arity<S: Into<String>>(op: S, expected: usize, actual: usize) -> Self {
        Self::Arity {
            op: op.into(),
            expected,
            actual,
        }
    }
}

/// Result type alias for autodiff operations.
pub type Result<T> = std::result::Result<T, AutodiffError>;
