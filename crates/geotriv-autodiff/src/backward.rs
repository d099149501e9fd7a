//! Backward pass implementation for automatic differentiation.
//!
//! This module implements the backpropagation algorithm to compute
//! gradients through the computation graph.

use crate::error::{AutodiffError, Result};
use crate::graph::{Graph, NodeId};
use geotriv_core::tensor::format_shape;
use geotriv_core::Tensor;
use std::collections::HashMap;
use tracing::trace;

/// Type alias for gradient storage.
pub type GradientMap = HashMap<NodeId, Tensor>;

/// Performs backward pass (backpropagation) through the graph.
///
/// The forward pass is run first if `output_node` has no cached value.
///
/// # Arguments
/// * `graph` - The computation graph
/// * `output_node` - The node to compute gradients from
/// * `grad_output` - The initial gradient; defaults to ones shaped like the output
///
/// # Returns
/// A map from node IDs to their gradients
pub fn backward(graph: &Graph, output_node: NodeId, grad_output: Option<Tensor>) -> Result<GradientMap> {
    let output = graph.forward(output_node)?;
    let initial = match grad_output {
        Some(grad) => {
            grad.expect_shape(output.shape())?;
            grad
        }
        None => Tensor::full(output.shape(), 1.0),
    };

    let mut gradients = GradientMap::new();
    gradients.insert(output_node, initial);

    for &node_id in graph.topological_order().iter().rev() {
        let Some(node_grad) = gradients.get(&node_id).cloned() else {
            continue;
        };
        let node_rc = graph.get_node(node_id).ok_or(AutodiffError::UnknownNode(node_id))?;
        let node = node_rc.borrow();
        if !node.requires_grad {
            continue;
        }
        let (Some(op), Some(value)) = (&node.op, &node.value) else {
            continue;
        };

        let inputs = node
            .inputs
            .iter()
            .map(|&id| graph.forward(id))
            .collect::<Result<Vec<_>>>()?;
        let input_grads = op.backward(&node_grad, &inputs, value)?;
        trace!(node = %node_id, op = op.name(), "backward");

        // Accumulate gradients for input nodes
        for (&input_id, grad) in node.inputs.iter().zip(input_grads) {
            let wants_grad = graph
                .get_node(input_id)
                .is_some_and(|n| n.borrow().requires_grad);
            if !wants_grad {
                continue;
            }
            match gradients.get_mut(&input_id) {
                Some(existing) => *existing = existing.zip_map(&grad, |a, b| a + b)?,
                None => {
                    gradients.insert(input_id, grad);
                }
            }
        }
    }

    Ok(gradients)
}

/// Computes the gradient of an output with respect to specified inputs.
///
/// Inputs that the output does not depend on get a zero gradient.
pub fn grad(graph: &Graph, output_node: NodeId, input_nodes: &[NodeId]) -> Result<GradientMap> {
    let mut all = backward(graph, output_node, None)?;
    input_nodes
        .iter()
        .map(|&id| {
            let grad = match all.remove(&id) {
                Some(grad) => grad,
                None => Tensor::zeros(graph.forward(id)?.shape()),
            };
            Ok((id, grad))
        })
        .collect()
}

/// Checks gradients using central finite differences.
///
/// # Arguments
/// * `graph` - The computation graph
/// * `output_node` - A scalar output node
/// * `input_node` - The leaf to check the gradient for
/// * `epsilon` - Step of the finite differences
///
/// # Returns
/// The maximum error between analytical and numerical gradients, relative
/// for entries of magnitude above one and absolute below
///
/// # Errors
/// `NotScalar` if the output has more than one element.
pub fn check_gradients(
    graph: &Graph,
    output_node: NodeId,
    input_node: NodeId,
    epsilon: f64,
) -> Result<f64> {
    let scalar = |graph: &Graph| -> Result<f64> {
        let value = graph.forward(output_node)?;
        match value.as_slice() {
            [v] => Ok(*v),
            _ => Err(AutodiffError::NotScalar {
                shape: format_shape(value.shape()),
            }),
        }
    };
    scalar(graph)?;

    let analytical = grad(graph, output_node, &[input_node])?
        .remove(&input_node)
        .ok_or(AutodiffError::UnknownNode(input_node))?;
    let original = graph.forward(input_node)?;

    let mut max_error: f64 = 0.0;
    for i in 0..original.len() {
        let mut perturbed = original.clone();
        perturbed.as_mut_slice()[i] += epsilon;
        graph.set_value(input_node, perturbed)?;
        let f_plus = scalar(graph)?;

        let mut perturbed = original.clone();
        perturbed.as_mut_slice()[i] -= epsilon;
        graph.set_value(input_node, perturbed)?;
        let f_minus = scalar(graph)?;

        let numerical = (f_plus - f_minus) / (2.0 * epsilon);
        let exact = analytical.as_slice()[i];
        let denom = numerical.abs().max(exact.abs()).max(1.0);
        max_error = max_error.max((numerical - exact).abs() / denom);
    }
    graph.set_value(input_node, original)?;

    Ok(max_error)
}
