//! Automatic differentiation for trivialized manifolds.
//!
//! This crate provides a minimal reverse-mode autodiff engine in which the
//! trivializations of `geotriv-manifolds` take part as ordinary operations.
//!
//! # Features
//!
//! - **Computation graphs**: Dynamic graph construction with cached values
//! - **Reverse mode AD**: Gradient computation via backpropagation
//! - **Custom gradients**: [`ops::Sinc`] supplies its derivative explicitly and
//!   is differentiable at the origin
//! - **Manifold awareness**: Sphere retractions as graph expressions and any
//!   manifold as a single node through its pullback
//!
//! # Architecture
//!
//! 1. **Graph**: Manages the computation graph structure
//! 2. **Operations**: Defines forward and backward operations
//! 3. **Backward**: Implements the backpropagation algorithm
//! 4. **Integration**: Connects manifolds and their storage to the graph

pub mod backward;
pub mod error;
pub mod graph;
pub mod integration;
pub mod manifold_ops;
pub mod ops;

// Re-export key types
pub use backward::{backward, check_gradients, grad, GradientMap};
pub use error::{AutodiffError, Result};
pub use graph::{Graph, Node, NodeId, Variable};
pub use integration::{LossBuilder, ParametrizedFunction, SphereGraph};
pub use manifold_ops::{Normalize, TangentFrame, TrivializationOp};
pub use ops::Op;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backward::{backward, check_gradients, grad, GradientMap};
    pub use crate::error::AutodiffError;
    pub use crate::graph::{Graph, NodeId, Variable};
    pub use crate::integration::{ParametrizedFunction, SphereGraph};
    pub use crate::manifold_ops::*;
    pub use crate::ops::*;
}
