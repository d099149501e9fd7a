//! Integration of automatic differentiation with manifold operations.
//!
//! This module provides the bridge between the autodiff engine and the
//! trivializations: the two sphere retractions written as graph expressions,
//! manifolds inserted into a graph as single nodes, and the gradient of a
//! loss with respect to the raw storage of a registered manifold.

use crate::backward::grad;
use crate::error::{AutodiffError, Result};
use crate::graph::{Graph, NodeId};
use crate::manifold_ops::{Normalize, TangentFrame, TrivializationOp};
use crate::ops::{Add, Cos, LastAxisNorm, LastAxisScale, Scale, Sinc};
use geotriv_core::tensor::format_shape;
use geotriv_core::{Manifold, Tensor, TrivializationError};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Extension trait for [`Graph`] to add manifold-aware operations.
pub trait SphereGraph {
    /// Radial projection onto the sphere of radius `r`, `r x / ||x||`.
    fn project_sphere(&self, x: NodeId, r: f64) -> NodeId;

    /// Exponential map on the sphere of radius `r` at the base point `base`.
    ///
    /// `base` is normalised first and `v` is projected onto its tangent
    /// space, so neither has to be exact. The gradient is well defined at
    /// `v = 0`.
    fn sphere_exponential(&self, base: NodeId, v: NodeId, r: f64) -> NodeId;

    /// Applies `manifold`'s forward map as one node.
    ///
    /// # Errors
    /// Fails if the manifold does not act on single tensors.
    fn trivialize(&self, x: NodeId, manifold: Rc<dyn Manifold>) -> Result<NodeId>;
}

impl SphereGraph for Graph {
    fn project_sphere(&self, x: NodeId, r: f64) -> NodeId {
        let unit = self.apply_op(Box::new(Normalize), &[x]);
        self.apply_op(Box::new(Scale(r)), &[unit])
    }

    fn sphere_exponential(&self, base: NodeId, v: NodeId, r: f64) -> NodeId {
        let x = self.apply_op(Box::new(Normalize), &[base]);
        let frame = self.apply_op(Box::new(TangentFrame), &[x, v]);
        let rho = self.apply_op(Box::new(LastAxisNorm), &[frame]);

        // r (cos ρ x + sinc ρ v')
        let cos = self.apply_op(Box::new(Cos), &[rho]);
        let sinc = self.apply_op(Box::new(Sinc), &[rho]);
        let along_base = self.apply_op(Box::new(LastAxisScale), &[cos, x]);
        let along_tangent = self.apply_op(Box::new(LastAxisScale), &[sinc, frame]);
        let unit = self.apply_op(Box::new(Add), &[along_base, along_tangent]);
        self.apply_op(Box::new(Scale(r)), &[unit])
    }

    fn trivialize(&self, x: NodeId, manifold: Rc<dyn Manifold>) -> Result<NodeId> {
        let op = TrivializationOp::new(manifold)?;
        Ok(self.apply_op(Box::new(op), &[x]))
    }
}

/// Builds the loss on top of the manifold's output node.
pub type LossBuilder = dyn Fn(&Graph, NodeId) -> Result<NodeId>;

/// A scalar loss of a registered manifold's value.
///
/// Every evaluation reads the current raw storage, so updates made by an
/// optimizer between calls are picked up.
pub struct ParametrizedFunction {
    manifold: Rc<dyn Manifold>,
    loss: Box<LossBuilder>,
}

impl ParametrizedFunction {
    /// Creates a function of `manifold`'s value.
    ///
    /// # Errors
    /// - `NotRegistered` if `manifold` has no storage yet
    /// - `ShapeMismatch` if it does not act on single tensors
    pub fn new<F>(manifold: Rc<dyn Manifold>, loss: F) -> Result<Self>
    where
        F: Fn(&Graph, NodeId) -> Result<NodeId> + 'static,
    {
        if !manifold.is_registered() {
            return Err(TrivializationError::not_registered(manifold.name()).into());
        }
        TrivializationOp::new(Rc::clone(&manifold))?;
        Ok(Self {
            manifold,
            loss: Box::new(loss),
        })
    }

    /// The manifold the loss is defined on.
    pub fn manifold(&self) -> &Rc<dyn Manifold> {
        &self.manifold
    }

    fn build(&self) -> Result<(Graph, NodeId, NodeId)> {
        let raw = self.manifold.original_tensor()?.borrow().as_tensor()?.clone();
        let graph = Graph::new();
        let x = graph.named_variable(raw, "storage");
        let point = graph.trivialize(x.id, Rc::clone(&self.manifold))?;
        let output = (self.loss)(&graph, point)?;
        Ok((graph, x.id, output))
    }

    fn scalar(graph: &Graph, output: NodeId) -> Result<f64> {
        let value = graph.forward(output)?;
        match value.as_slice() {
            [v] => Ok(*v),
            _ => Err(AutodiffError::NotScalar {
                shape: format_shape(value.shape()),
            }),
        }
    }

    /// The loss at the current storage.
    pub fn value(&self) -> Result<f64> {
        let (graph, _, output) = self.build()?;
        Self::scalar(&graph, output)
    }

    /// The loss and its gradient with respect to the raw storage.
    pub fn value_and_grad(&self) -> Result<(f64, Tensor)> {
        let (graph, storage, output) = self.build()?;
        let value = Self::scalar(&graph, output)?;
        let gradient = grad(&graph, output, &[storage])?
            .remove(&storage)
            .ok_or(AutodiffError::UnknownNode(storage))?;
        debug!(
            manifold = self.manifold.name(),
            nodes = graph.num_nodes(),
            value,
            "evaluated parametrized loss"
        );
        Ok((value, gradient))
    }
}

impl fmt::Debug for ParametrizedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametrizedFunction")
            .field("manifold", &self.manifold.describe().to_string())
            .finish_non_exhaustive()
    }
}
