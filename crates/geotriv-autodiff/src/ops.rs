//! Operations for the computation graph.
//!
//! Every operation supplies its forward computation and an explicit backward
//! rule. Elementwise operations require inputs of identical shape. The
//! `LastAxis*` operations treat a tensor of shape `(.., n)` as a batch of
//! vectors and produce one value per vector.

use crate::error::{AutodiffError, Result};
use geotriv_core::stability::{sinc, sinc_grad};
use geotriv_core::Tensor;
use nalgebra::DVector;
use std::fmt::Debug;

/// Trait for operations in the computation graph.
pub trait Op: Debug {
    /// Performs the forward computation.
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor>;

    /// Computes the gradient with respect to each input.
    ///
    /// # Arguments
    /// * `grad_output` - The gradient flowing from the output
    /// * `inputs` - The input values used in the forward pass
    /// * `output` - The output value from the forward pass
    ///
    /// # Returns
    /// A vector of gradients, one for each input
    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], output: &Tensor)
        -> Result<Vec<Tensor>>;

    /// Returns the name of this operation.
    fn name(&self) -> &str;
}

pub(crate) fn expect_inputs(op: &dyn Op, inputs: &[Tensor], expected: usize) -> Result<()> {
    if inputs.len() == expected {
        Ok(())
    } else {
        Err(AutodiffError::arity(op.name(), expected, inputs.len()))
    }
}

/// Shape of one value per vector of `t`.
fn reduced_shape(t: &Tensor) -> &[usize] {
    t.batch_shape(1)
}

/// Builds a tensor of one value per vector from an iterator.
fn per_vector<I: IntoIterator<Item = f64>>(like: &Tensor, values: I) -> Result<Tensor> {
    Ok(Tensor::from_vec(reduced_shape(like), values.into_iter().collect())?)
}

/// Element-wise addition operation.
#[derive(Debug, Clone)]
pub struct Add;

impl Op for Add {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 2)?;
        Ok(inputs[0].zip_map(&inputs[1], |a, b| a + b)?)
    }

    fn backward(&self, grad_output: &Tensor, _inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        Ok(vec![grad_output.clone(), grad_output.clone()])
    }

    fn name(&self) -> &str {
        "Add"
    }
}

/// Element-wise multiplication operation.
#[derive(Debug, Clone)]
pub struct Multiply;

impl Op for Multiply {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 2)?;
        Ok(inputs[0].zip_map(&inputs[1], |a, b| a * b)?)
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        // d/dx (x * y) = y
        // d/dy (x * y) = x
        Ok(vec![
            grad_output.zip_map(&inputs[1], |g, y| g * y)?,
            grad_output.zip_map(&inputs[0], |g, x| g * x)?,
        ])
    }

    fn name(&self) -> &str {
        "Multiply"
    }
}

/// Negation operation.
#[derive(Debug, Clone)]
pub struct Negate;

impl Op for Negate {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        Ok(inputs[0].map(|x| -x))
    }

    fn backward(&self, grad_output: &Tensor, _inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        Ok(vec![grad_output.map(|g| -g)])
    }

    fn name(&self) -> &str {
        "Negate"
    }
}

/// Multiplication by a fixed scalar.
#[derive(Debug, Clone)]
pub struct Scale(pub f64);

impl Op for Scale {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        Ok(inputs[0].scale(self.0))
    }

    fn backward(&self, grad_output: &Tensor, _inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        Ok(vec![grad_output.scale(self.0)])
    }

    fn name(&self) -> &str {
        "Scale"
    }
}

/// Sum of all elements, as a scalar of shape `()`.
#[derive(Debug, Clone)]
pub struct Sum;

impl Op for Sum {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        Ok(Tensor::full(&[], inputs[0].sum()))
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        let g = grad_output.sum();
        Ok(vec![Tensor::full(inputs[0].shape(), g)])
    }

    fn name(&self) -> &str {
        "Sum"
    }
}

/// Element-wise cosine.
#[derive(Debug, Clone)]
pub struct Cos;

impl Op for Cos {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        Ok(inputs[0].map(f64::cos))
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        Ok(vec![grad_output.zip_map(&inputs[0], |g, x| -g * x.sin())?])
    }

    fn name(&self) -> &str {
        "Cos"
    }
}

/// Element-wise `sin(x)/x` with a hand-written derivative.
///
/// The backward pass uses [`sinc_grad`], which is exactly zero near the
/// removable singularity instead of differentiating the quotient.
#[derive(Debug, Clone)]
pub struct Sinc;

impl Op for Sinc {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        Ok(inputs[0].map(sinc))
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        Ok(vec![grad_output.zip_map(&inputs[0], |g, x| g * sinc_grad(x))?])
    }

    fn name(&self) -> &str {
        "Sinc"
    }
}

/// Euclidean norm along the last axis, `(.., n) → (..)`.
///
/// The gradient at a zero vector is taken to be zero.
#[derive(Debug, Clone)]
pub struct LastAxisNorm;

impl Op for LastAxisNorm {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 1)?;
        let x = &inputs[0];
        per_vector(x, (0..x.num_vectors()).map(|i| x.vector(i).norm()))
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], output: &Tensor) -> Result<Vec<Tensor>> {
        let x = &inputs[0];
        let (g, norms) = (grad_output.as_slice(), output.as_slice());
        let n = x.shape().last().copied().unwrap_or(1);
        let grad = x.try_map_vectors(n, |i, v| {
            if norms[i] > 0.0 {
                Ok(v * (g[i] / norms[i]))
            } else {
                Ok(DVector::zeros(n))
            }
        })?;
        Ok(vec![grad])
    }

    fn name(&self) -> &str {
        "LastAxisNorm"
    }
}

/// Inner product along the last axis, `(.., n) × (.., n) → (..)`.
#[derive(Debug, Clone)]
pub struct LastAxisDot;

impl Op for LastAxisDot {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 2)?;
        let (x, y) = (&inputs[0], &inputs[1]);
        y.expect_shape(x.shape())?;
        per_vector(x, (0..x.num_vectors()).map(|i| x.vector(i).dot(&y.vector(i))))
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        let (x, y) = (&inputs[0], &inputs[1]);
        let g = grad_output.as_slice();
        let n = x.shape().last().copied().unwrap_or(1);
        Ok(vec![
            y.try_map_vectors(n, |i, v| Ok(v * g[i]))?,
            x.try_map_vectors(n, |i, v| Ok(v * g[i]))?,
        ])
    }

    fn name(&self) -> &str {
        "LastAxisDot"
    }
}

/// Scales every vector by its own coefficient, `(..) × (.., n) → (.., n)`.
#[derive(Debug, Clone)]
pub struct LastAxisScale;

impl Op for LastAxisScale {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        expect_inputs(self, inputs, 2)?;
        let (a, x) = (&inputs[0], &inputs[1]);
        a.expect_shape(reduced_shape(x))?;
        let n = x.shape().last().copied().unwrap_or(1);
        let coefficients = a.as_slice();
        x.try_map_vectors(n, |i, v| Ok(v * coefficients[i]))
            .map_err(AutodiffError::from)
    }

    fn backward(&self, grad_output: &Tensor, inputs: &[Tensor], _output: &Tensor) -> Result<Vec<Tensor>> {
        let (a, x) = (&inputs[0], &inputs[1]);
        let n = x.shape().last().copied().unwrap_or(1);
        let coefficients = a.as_slice();
        let grad_a = per_vector(
            x,
            (0..x.num_vectors()).map(|i| grad_output.vector(i).dot(&x.vector(i))),
        )?;
        let grad_x = grad_output.try_map_vectors(n, |i, g| Ok(g * coefficients[i]))?;
        Ok(vec![grad_a, grad_x])
    }

    fn name(&self) -> &str {
        "LastAxisScale"
    }
}
