//! Manifold-specific operations for automatic differentiation.
//!
//! [`Normalize`] and [`TangentFrame`] are the building blocks of the sphere
//! maps in [`crate::integration`]. [`TrivializationOp`] wraps any
//! single-tensor manifold so that its forward map and pullback take part in
//! a computation graph.

use crate::error::Result;
use crate::ops::{expect_inputs, Op};
use geotriv_core::{Manifold, Signature, Tensor, TrivializationError, Value};
use nalgebra::DVector;
use std::fmt;
use std::rc::Rc;

fn last_axis(t: &Tensor) -> usize {
    t.shape().last().copied().unwrap_or(1)
}

/// Radial projection onto the unit sphere along the last axis, `x / ||x||`.
///
/// Undefined at zero vectors, where it yields NaN.
#[derive(Debug, Clone)]
pub struct Normalize;

impl Op for Normalize {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        unit_vectors(&inputs[0])
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], output: &Tensor) -> Result<Vec<Tensor>> {
        let x = &inputs[0];
        // d/dx (x/||x||) = (I - uuᵀ) / ||x||
        let grad = grad_output.try_map_vectors(last_axis(x), |i, g| {
            let u = output.vector(i);
            let norm = x.vector(i).norm();
            Ok((&g - &u * u.dot(&g)) / norm)
        })?;
        Ok(vec![grad])
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}

/// Projection of `v` onto the tangent space at the unit vector `x`,
/// `v - <x, v> x`, along the last axis. Inputs are `[x, v]`.
#[derive(Debug, Clone)]
pub struct TangentFrame;

impl Op for TangentFrame {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 2)?;
        let (x, v) = (&inputs[0], &inputs[1]);
        v.expect_shape(x.shape())?;
        Ok(v.try_map_vectors(last_axis(v), |i, v| {
            let x = x.vector(i);
            Ok(&v - &x * x.dot(&v))
        })?)
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        let (x, v) = (&inputs[0], &inputs[1]);
        let n = last_axis(x);
        // Gradient w.r.t. x: -<g, x> v - <x, v> g
        let grad_x = grad_output.try_map_vectors(n, |i, g| {
            let (xi, vi) = (x.vector(i), v.vector(i));
            Ok(-(&vi * g.dot(&xi) + &g * xi.dot(&vi)))
        })?;
        // Gradient w.r.t. v: g - <g, x> x
        let grad_v = grad_output.try_map_vectors(n, |i, g| {
            let xi = x.vector(i);
            Ok(&g - &xi * xi.dot(&g))
        })?;
        Ok(vec![grad_x, grad_v])
    }

    fn name(&self) -> &str {
        "TangentFrame"
    }
}

/// A manifold's forward map as a graph operation.
///
/// The backward pass is the manifold's own pullback, so gradients flowing
/// through the node are exactly those the manifold defines. Only manifolds
/// whose ambient and output values are single tensors can be wrapped.
#[derive(Clone)]
pub struct TrivializationOp {
    manifold: Rc<dyn Manifold>,
}

impl TrivializationOp {
    /// Wraps `manifold`.
    ///
    /// # Errors
    /// `ShapeMismatch` if the manifold acts on named components.
    pub fn new(manifold: Rc<dyn Manifold>) -> Result<Self> {
        for signature in [manifold.ambient_signature(), manifold.output_signature()] {
            if let Signature::Named(_) = signature {
                return Err(TrivializationError::shape_mismatch(
                    "a single tensor",
                    format!("named components for {}", manifold.name()),
                )
                .into());
            }
        }
        Ok(Self { manifold })
    }

    /// The wrapped manifold.
    pub fn manifold(&self) -> &Rc<dyn Manifold> {
        &self.manifold
    }
}

impl fmt::Debug for TrivializationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrivializationOp")
            .field("manifold", &self.manifold.describe().to_string())
            .finish()
    }
}

impl Op for TrivializationOp {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        let out = self.manifold.forward(&Value::from(inputs[0].clone()))?;
        Ok(out.into_tensor()?)
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        let grad = self.manifold.pullback(
            &Value::from(inputs[0].clone()),
            &Value::from(grad_output.clone()),
        )?;
        Ok(vec![grad.into_tensor()?])
    }

    fn name(&self) -> &str {
        self.manifold.name()
    }
}

/// Every vector along the last axis divided by its norm.
pub fn unit_vectors(x: &Tensor) -> Result<Tensor> {
    Ok(x.try_map_vectors(last_axis(x), |_, v: DVector<f64>| {
        let norm = v.norm();
        Ok(v / norm)
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::check_gradients;
    use crate::graph::Graph;
    use crate::ops::{LastAxisDot, Sum};
    use approx::assert_relative_eq;
    use geotriv_manifolds::{SphereEmbedded, Stiefel};

    fn t(shape: &[usize], data: &[f64]) -> Tensor {
        Tensor::from_vec(shape, data.to_vec()).unwrap()
    }

    #[test]
    fn test_normalize_forward_and_gradient() {
        let graph = Graph::new();
        let x = graph.variable(t(&[2, 3], &[3.0, 0.0, 4.0, 1.0, -2.0, 0.5]));
        let u = graph.apply_op(Box::new(Normalize), &[x.id]);
        let value = graph.forward(u).unwrap();
        assert_relative_eq!(value.as_slice()[..3], [0.6, 0.0, 0.8][..], epsilon = 1e-12);
        assert_relative_eq!(value.vector(1).norm(), 1.0, epsilon = 1e-12);

        let w = graph.constant(t(&[2, 3], &[1.0, 2.0, -1.0, 0.3, 0.2, 0.1]));
        let dot = graph.apply_op(Box::new(LastAxisDot), &[u, w]);
        let loss = graph.apply_op(Box::new(Sum), &[dot]);
        assert!(check_gradients(&graph, loss, x.id, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_tangent_frame_gradients() {
        let graph = Graph::new();
        let x = graph.variable(t(&[3], &[0.2, -0.4, 0.7]));
        let v = graph.variable(t(&[3], &[1.0, 0.5, -0.3]));
        let frame = graph.apply_op(Box::new(TangentFrame), &[x.id, v.id]);
        let w = graph.constant(t(&[3], &[0.4, -1.0, 2.0]));
        let loss = graph.apply_op(Box::new(LastAxisDot), &[frame, w]);
        assert!(check_gradients(&graph, loss, x.id, 1e-6).unwrap() < 1e-6);
        assert!(check_gradients(&graph, loss, v.id, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_tangent_frame_is_orthogonal_to_unit_base() {
        let x = unit_vectors(&t(&[3], &[1.0, 2.0, 2.0])).unwrap();
        let v = t(&[3], &[0.3, -1.0, 4.0]);
        let out = TangentFrame.forward(&[x.clone(), v]).unwrap();
        assert_relative_eq!(out.dot(&x).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_trivialization_op() {
        let sphere: Rc<dyn Manifold> = Rc::new(SphereEmbedded::new(&[2, 4], 3.0).unwrap());
        let op = TrivializationOp::new(Rc::clone(&sphere)).unwrap();
        assert_eq!(op.name(), "SphereEmbedded");

        let graph = Graph::new();
        let x = graph.variable(t(&[2, 4], &[1.0, 2.0, -1.0, 0.5, 0.1, 0.2, 0.3, -0.4]));
        let y = graph.apply_op(Box::new(op), &[x.id]);
        let out = graph.forward(y).unwrap();
        assert!(sphere.contains(&out.clone().into(), 1e-12));

        let w = graph.constant(t(&[2, 4], &[0.5, -1.0, 1.5, 2.0, 0.0, 1.0, -2.0, 0.3]));
        let dot = graph.apply_op(Box::new(LastAxisDot), &[y, w]);
        let loss = graph.apply_op(Box::new(Sum), &[dot]);
        assert!(check_gradients(&graph, loss, x.id, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_trivialization_op_requires_single_tensor() {
        let stiefel: Rc<dyn Manifold> = Rc::new(Stiefel::new(&[4, 2]).unwrap());
        assert!(TrivializationOp::new(stiefel).is_ok());

        let product: Rc<dyn Manifold> = Rc::new(
            geotriv_manifolds::ProductManifold::new(vec![(
                "a".to_string(),
                Box::new(SphereEmbedded::new(&[3], 1.0).unwrap()) as Box<dyn Manifold>,
            )])
            .unwrap(),
        );
        assert!(TrivializationOp::new(product).is_err());
    }
}
