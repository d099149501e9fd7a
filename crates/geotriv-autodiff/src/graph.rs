//! Computation graph for automatic differentiation.
//!
//! This module implements a dynamic computation graph that tracks operations
//! and their dependencies. Values are computed lazily by [`Graph::forward`]
//! and cached on the nodes; assigning a new value to a leaf clears every
//! cached intermediate result.

use crate::error::{AutodiffError, Result};
use crate::ops::Op;
use geotriv_core::Tensor;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Unique identifier for nodes in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node{}", self.0)
    }
}

/// A variable in the computation graph.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Unique identifier for this variable
    pub id: NodeId,
    /// Name of the variable (optional)
    pub name: Option<String>,
    /// Whether this variable requires gradient computation
    pub requires_grad: bool,
}

impl Variable {
    /// Creates a new variable with the given ID.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            name: None,
            requires_grad: true,
        }
    }

    /// Sets the name of the variable.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A node in the computation graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// The value computed at this node
    pub value: Option<Tensor>,
    /// The operation that produced this node
    pub op: Option<Box<dyn Op>>,
    /// Input nodes to this operation
    pub inputs: Vec<NodeId>,
    /// Whether this node requires gradient
    pub requires_grad: bool,
    /// Optional name for debugging
    pub name: Option<String>,
}

impl Node {
    /// Creates a new input node with a value.
    pub fn input(id: NodeId, value: Tensor, requires_grad: bool) -> Self {
        Self {
            id,
            value: Some(value),
            op: None,
            inputs: Vec::new(),
            requires_grad,
            name: None,
        }
    }

    /// Creates a new node from an operation.
    pub fn from_op(id: NodeId, op: Box<dyn Op>, inputs: Vec<NodeId>, requires_grad: bool) -> Self {
        Self {
            id,
            value: None,
            op: Some(op),
            inputs,
            requires_grad,
            name: None,
        }
    }

    /// Checks if this node is a leaf (has no operation).
    pub fn is_leaf(&self) -> bool {
        self.op.is_none()
    }
}

/// The computation graph structure.
#[derive(Debug)]
pub struct Graph {
    /// All nodes in the graph, indexed by their ID
    nodes: RefCell<HashMap<NodeId, Rc<RefCell<Node>>>>,
    /// Counter for generating unique node IDs
    next_id: Cell<usize>,
    /// Whether to track gradients
    track_gradients: bool,
}

impl Graph {
    /// Creates a new empty computation graph.
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            track_gradients: true,
        }
    }

    /// Creates a new graph with gradient tracking disabled.
    pub fn no_grad() -> Self {
        Self {
            track_gradients: false,
            ..Self::new()
        }
    }

    fn new_node_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn insert(&self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.borrow_mut().insert(id, Rc::new(RefCell::new(node)));
        id
    }

    /// Creates a new variable (input node) in the graph.
    pub fn variable(&self, value: Tensor) -> Variable {
        let id = self.insert(Node::input(self.new_node_id(), value, self.track_gradients));
        Variable::new(id)
    }

    /// Creates a new variable with a name.
    pub fn named_variable(&self, value: Tensor, name: impl Into<String>) -> Variable {
        let name = name.into();
        let mut node = Node::input(self.new_node_id(), value, self.track_gradients);
        node.name = Some(name.clone());
        Variable::new(self.insert(node)).with_name(name)
    }

    /// Creates a constant (non-differentiable) node in the graph.
    pub fn constant(&self, value: Tensor) -> NodeId {
        self.insert(Node::input(self.new_node_id(), value, false))
    }

    /// Creates a new node from an operation.
    ///
    /// Inputs are not evaluated here; arity and shapes are checked by
    /// [`Graph::forward`].
    pub fn apply_op(&self, op: Box<dyn Op>, inputs: &[NodeId]) -> NodeId {
        let requires_grad = self.track_gradients
            && inputs.iter().any(|&input| {
                self.get_node(input)
                    .is_some_and(|n| n.borrow().requires_grad)
            });
        self.insert(Node::from_op(self.new_node_id(), op, inputs.to_vec(), requires_grad))
    }

    /// Gets a node by its ID.
    pub fn get_node(&self, id: NodeId) -> Option<Rc<RefCell<Node>>> {
        self.nodes.borrow().get(&id).cloned()
    }

    /// Gets the cached value of a node.
    pub fn get_value(&self, id: NodeId) -> Option<Tensor> {
        self.get_node(id).and_then(|node| node.borrow().value.clone())
    }

    /// Assigns a value to a leaf and clears every cached intermediate value.
    ///
    /// # Errors
    /// `UnknownNode` if `id` is not in the graph.
    pub fn set_value(&self, id: NodeId, value: Tensor) -> Result<()> {
        let node = self.get_node(id).ok_or(AutodiffError::UnknownNode(id))?;
        node.borrow_mut().value = Some(value);
        self.clear_values();
        Ok(())
    }

    /// Evaluates `target`, computing and caching every value it depends on.
    ///
    /// # Errors
    /// - `UnknownNode` / `MissingValue` for dangling or empty nodes
    /// - any error returned by an operation's forward pass
    pub fn forward(&self, target: NodeId) -> Result<Tensor> {
        let node = self.get_node(target).ok_or(AutodiffError::UnknownNode(target))?;
        let inputs = {
            let node = node.borrow();
            if let Some(value) = &node.value {
                return Ok(value.clone());
            }
            if node.is_leaf() {
                return Err(AutodiffError::MissingValue(target));
            }
            node.inputs.clone()
        };

        let values = inputs
            .iter()
            .map(|&input| self.forward(input))
            .collect::<Result<Vec<_>>>()?;

        let result = {
            let node = node.borrow();
            let op = node.op.as_ref().ok_or(AutodiffError::MissingValue(target))?;
            op.forward(&values)?
        };
        node.borrow_mut().value = Some(result.clone());
        Ok(result)
    }

    /// Clears all computed values in the graph, keeping leaf values.
    pub fn clear_values(&self) {
        for node in self.nodes.borrow().values() {
            let mut node = node.borrow_mut();
            if !node.is_leaf() {
                node.value = None;
            }
        }
    }

    /// Gets all nodes in topological order, inputs before the nodes using them.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.borrow().keys().copied().collect();
        ids.sort_unstable();

        let mut visited = HashMap::new();
        let mut order = Vec::with_capacity(ids.len());
        for id in ids {
            self.visit_topological(id, &mut visited, &mut order);
        }
        order
    }

    fn visit_topological(
        &self,
        node_id: NodeId,
        visited: &mut HashMap<NodeId, bool>,
        order: &mut Vec<NodeId>,
    ) {
        if visited.insert(node_id, true).is_some() {
            return;
        }
        if let Some(node) = self.get_node(node_id) {
            for &input_id in &node.borrow().inputs {
                self.visit_topological(input_id, visited, order);
            }
        }
        order.push(node_id);
    }

    /// Returns the number of nodes in the graph.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Whether new variables require gradients.
    pub fn tracks_gradients(&self) -> bool {
        self.track_gradients
    }

    /// Enables gradient tracking.
    pub fn enable_grad(&mut self) {
        self.track_gradients = true;
    }

    /// Disables gradient tracking.
    pub fn disable_grad(&mut self) {
        self.track_gradients = false;
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Add, Scale};

    #[test]
    fn test_graph_creation() {
        let graph = Graph::new();
        assert_eq!(graph.num_nodes(), 0);
        assert!(graph.tracks_gradients());
        assert!(!Graph::no_grad().tracks_gradients());
    }

    #[test]
    fn test_variable_creation() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::full(&[2, 2], 1.0));
        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(x.id, NodeId(0));
        assert_eq!(graph.get_value(x.id).unwrap().shape(), &[2, 2]);

        let named = graph.named_variable(Tensor::zeros(&[3]), "input");
        assert_eq!(named.name.as_deref(), Some("input"));
    }

    #[test]
    fn test_forward_caches_and_invalidates() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::full(&[2], 3.0));
        let y = graph.apply_op(Box::new(Scale(2.0)), &[x.id]);
        assert_eq!(graph.forward(y).unwrap().as_slice(), &[6.0, 6.0]);
        assert!(graph.get_value(y).is_some());

        graph.set_value(x.id, Tensor::full(&[2], 1.0)).unwrap();
        assert!(graph.get_value(y).is_none());
        assert_eq!(graph.forward(y).unwrap().as_slice(), &[2.0, 2.0]);
    }

    #[test]
    fn test_topological_order() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::full(&[1], 1.0));
        let y = graph.variable(Tensor::full(&[1], 2.0));
        let z = graph.apply_op(Box::new(Add), &[x.id, y.id]);
        let w = graph.apply_op(Box::new(Add), &[z, x.id]);
        let order = graph.topological_order();
        let position = |id| order.iter().position(|&n| n == id).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(x.id) < position(z));
        assert!(position(z) < position(w));
    }

    #[test]
    fn test_errors() {
        let graph = Graph::new();
        let x = graph.variable(Tensor::full(&[2], 1.0));
        let bad = graph.apply_op(Box::new(Add), &[x.id]);
        assert!(matches!(graph.forward(bad), Err(AutodiffError::Arity { .. })));
        assert!(matches!(
            graph.forward(NodeId(99)),
            Err(AutodiffError::UnknownNode(_))
        ));
        assert!(graph.set_value(NodeId(99), Tensor::zeros(&[1])).is_err());
    }
}
