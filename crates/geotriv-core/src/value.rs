//! Values flowing through manifolds and their shape-level signatures.
//!
//! Most manifolds map a single tensor to a single tensor. Factorised
//! manifolds go through intermediate stages that carry several named factors
//! at once (`U`, `S`, `V`), so a [`Value`] is either one tensor or an ordered
//! collection of named tensors.

use crate::error::{Result, TrivializationError};
use crate::named::OrderedMap;
use crate::tensor::{format_shape, Tensor};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Named tensors, in insertion order.
pub type NamedTensors = OrderedMap<Tensor>;

/// Shared handle to the raw, unconstrained storage of a parameter.
///
/// The host owns the storage and the optimizer writes it. A registered
/// manifold holds a clone of the handle and only writes through it during
/// canonical initialisation.
pub type Storage = Rc<RefCell<Value>>;

/// Wraps a value into a fresh storage handle.
pub fn new_storage<V: Into<Value>>(value: V) -> Storage {
    Rc::new(RefCell::new(value.into()))
}

/// A single tensor or a list of named tensors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single tensor.
    Tensor(Tensor),
    /// Several named tensors.
    Named(NamedTensors),
}

impl Value {
    /// The signature describing this value's shapes.
    pub fn signature(&self) -> Signature {
        match self {
            Self::Tensor(t) => Signature::Tensor(t.shape().to_vec()),
            Self::Named(map) => named_signature(map),
        }
    }

    /// Borrows the single tensor.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` for named values.
    pub fn as_tensor(&self) -> Result<&Tensor> {
        match self {
            Self::Tensor(t) => Ok(t),
            Self::Named(map) => Err(not_a_tensor(map)),
        }
    }

    /// Mutably borrows the single tensor.
    pub fn as_tensor_mut(&mut self) -> Result<&mut Tensor> {
        match self {
            Self::Tensor(t) => Ok(t),
            Self::Named(map) => Err(not_a_tensor(map)),
        }
    }

    /// Consumes the value and returns the single tensor.
    pub fn into_tensor(self) -> Result<Tensor> {
        match self {
            Self::Tensor(t) => Ok(t),
            Self::Named(map) => Err(not_a_tensor(&map)),
        }
    }

    /// Borrows the named tensors.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` for single tensors.
    pub fn as_named(&self) -> Result<&NamedTensors> {
        match self {
            Self::Named(map) => Ok(map),
            Self::Tensor(t) => Err(not_named(t)),
        }
    }

    /// Mutably borrows the named tensors.
    pub fn as_named_mut(&mut self) -> Result<&mut NamedTensors> {
        match self {
            Self::Named(map) => Ok(map),
            Self::Tensor(t) => Err(not_named(t)),
        }
    }

    /// Borrows the tensor stored under `name`.
    pub fn component(&self, name: &str) -> Result<&Tensor> {
        self.as_named()?.get(name).ok_or_else(|| {
            TrivializationError::shape_mismatch(
                format!("component `{name}`"),
                self.signature(),
            )
        })
    }

    fn tensors(&self) -> Vec<&Tensor> {
        match self {
            Self::Tensor(t) => vec![t],
            Self::Named(map) => map.values().collect(),
        }
    }

    fn tensors_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            Self::Tensor(t) => vec![t],
            Self::Named(map) => map.iter_mut().map(|(_, t)| t).collect(),
        }
    }

    /// Total number of scalar entries.
    pub fn len(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    /// Whether the value holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries concatenated in order.
    pub fn to_flat(&self) -> Vec<f64> {
        self.tensors()
            .into_iter()
            .flat_map(|t| t.as_slice().iter().copied())
            .collect()
    }

    /// A value with the same signature whose entries are taken from `flat`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` when `flat` has the wrong length.
    pub fn with_flat(&self, flat: &[f64]) -> Result<Self> {
        if flat.len() != self.len() {
            return Err(TrivializationError::shape_mismatch(
                format!("{} entries", self.len()),
                format!("{} entries", flat.len()),
            ));
        }
        let mut out = self.clone();
        let mut offset = 0;
        for t in out.tensors_mut() {
            let n = t.len();
            t.as_mut_slice().copy_from_slice(&flat[offset..offset + n]);
            offset += n;
        }
        Ok(out)
    }

    /// Euclidean inner product, summed over every tensor.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` when the signatures differ.
    pub fn dot(&self, other: &Self) -> Result<f64> {
        self.signature().check(other)?;
        Ok(self
            .to_flat()
            .iter()
            .zip(other.to_flat())
            .map(|(a, b)| a * b)
            .sum())
    }

    /// Multiplies every entry by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for t in out.tensors_mut() {
            t.as_mut_slice().iter_mut().for_each(|x| *x *= factor);
        }
        out
    }

    /// Frobenius norm over every tensor.
    pub fn norm(&self) -> f64 {
        self.to_flat().iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Largest absolute entry-wise difference, or infinity if signatures differ.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        if self.signature() != other.signature() {
            return f64::INFINITY;
        }
        self.to_flat()
            .iter()
            .zip(other.to_flat())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.is_finite())
    }
}

fn named_signature(map: &NamedTensors) -> Signature {
    Signature::Named(map.map_values(|_, t| t.shape().to_vec()))
}

fn not_a_tensor(map: &NamedTensors) -> TrivializationError {
    TrivializationError::shape_mismatch("a single tensor", named_signature(map))
}

fn not_named(t: &Tensor) -> TrivializationError {
    TrivializationError::shape_mismatch("named tensors", format_shape(t.shape()))
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<NamedTensors> for Value {
    fn from(map: NamedTensors) -> Self {
        Self::Named(map)
    }
}

/// Shape-level description of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// A single tensor of the given shape.
    Tensor(Vec<usize>),
    /// Named tensors with the given shapes, in order.
    Named(OrderedMap<Vec<usize>>),
}

impl Signature {
    /// Signature of a single tensor.
    pub fn tensor(shape: &[usize]) -> Self {
        Self::Tensor(shape.to_vec())
    }

    /// The shape of a single-tensor signature.
    pub fn as_shape(&self) -> Option<&[usize]> {
        match self {
            Self::Tensor(shape) => Some(shape),
            Self::Named(_) => None,
        }
    }

    /// Checks that `value` matches this signature exactly.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` describing both signatures.
    pub fn check(&self, value: &Value) -> Result<()> {
        let actual = value.signature();
        if *self == actual {
            Ok(())
        } else {
            Err(TrivializationError::shape_mismatch(self, actual))
        }
    }

    /// A zero value with this signature.
    pub fn zeros(&self) -> Value {
        match self {
            Self::Tensor(shape) => Value::Tensor(Tensor::zeros(shape)),
            Self::Named(shapes) => Value::Named(shapes.map_values(|_, s| Tensor::zeros(s))),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(shape) => write!(f, "{}", format_shape(shape)),
            Self::Named(shapes) => {
                write!(f, "{{")?;
                for (i, (name, shape)) in shapes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {}", format_shape(shape))?;
                }
                write!(f, "}}")
            }
        }
    }
}
