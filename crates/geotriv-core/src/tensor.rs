//! Dense n-dimensional tensors with batched access to vectors and matrices.
//!
//! A [`Tensor`] wraps an `ndarray` array of `f64` kept in standard (row-major)
//! layout. Manifolds interpret its trailing one (vector manifolds) or two
//! (matrix manifolds) axes as the structured part and every leading axis as
//! the *tensorial size*: an independent batch of points. The batch accessors
//! hand out `nalgebra` vectors and matrices so the linear algebra stays in
//! `nalgebra`.

use crate::error::{Result, TrivializationError};
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayD, ArrayView3, ArrayViewD, ArrayViewMutD, Axis, IxDyn, ShapeError, Zip};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Formats a shape as `(a, b, c)`.
pub fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("({})", dims.join(", "))
}

fn reshape_error(shape: &[usize]) -> impl FnOnce(ShapeError) -> TrivializationError + '_ {
    move |err| TrivializationError::shape_mismatch(format_shape(shape), err.to_string())
}

/// Row-major position of the `i`-th batch element.
fn unravel(mut i: usize, batch: &[usize]) -> Vec<usize> {
    let mut index = vec![0; batch.len()];
    for (slot, &dim) in index.iter_mut().zip(batch).rev() {
        *slot = i % dim;
        i /= dim;
    }
    index
}

/// A dense `f64` tensor in standard layout.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Tensor {
    data: ArrayD<f64>,
}

impl Tensor {
    /// Creates a tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Creates a tensor with every entry equal to `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Creates a tensor from row-major data.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `data` does not have `prod(shape)` entries.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let len = data.len();
        let data = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            TrivializationError::shape_mismatch(
                format!(
                    "{} entries for shape {}",
                    shape.iter().product::<usize>(),
                    format_shape(shape)
                ),
                format!("{len} entries"),
            )
        })?;
        Ok(Self { data })
    }

    /// Creates a tensor whose `i`-th row-major entry is `f(i)`.
    pub fn from_fn<F: FnMut(usize) -> f64>(shape: &[usize], mut f: F) -> Self {
        let mut out = Self::zeros(shape);
        out.data
            .iter_mut()
            .enumerate()
            .for_each(|(i, x)| *x = f(i));
        out
    }

    /// Samples every entry independently from the standard normal distribution.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let mut out = Self::zeros(shape);
        out.fill_randn(rng);
        out
    }

    /// Builds a batch of vectors. The result has shape `batch ++ [n]`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the number of vectors does not match the
    /// batch or the vectors have different lengths.
    pub fn from_vectors(batch: &[usize], n: usize, vectors: &[DVector<f64>]) -> Result<Self> {
        let mut shape = batch.to_vec();
        shape.push(n);
        let mut out = Self::zeros(&shape);
        if vectors.len() != out.num_vectors() {
            return Err(TrivializationError::shape_mismatch(
                format!("{} vectors", out.num_vectors()),
                format!("{} vectors", vectors.len()),
            ));
        }
        for (i, v) in vectors.iter().enumerate() {
            out.set_vector(i, v)?;
        }
        Ok(out)
    }

    /// Builds a batch of matrices. The result has shape `batch ++ [rows, cols]`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the number of matrices does not match the
    /// batch or a matrix is not `rows x cols`.
    pub fn from_matrices(
        batch: &[usize],
        rows: usize,
        cols: usize,
        matrices: &[DMatrix<f64>],
    ) -> Result<Self> {
        let mut shape = batch.to_vec();
        shape.extend([rows, cols]);
        let mut out = Self::zeros(&shape);
        if matrices.len() != out.num_matrices() {
            return Err(TrivializationError::shape_mismatch(
                format!("{} matrices", out.num_matrices()),
                format!("{} matrices", matrices.len()),
            ));
        }
        for (i, m) in matrices.iter().enumerate() {
            out.set_matrix(i, m)?;
        }
        Ok(out)
    }

    /// The underlying array.
    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Consumes the tensor and returns the underlying array.
    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }

    /// The shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor has no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major view of the entries.
    pub fn as_slice(&self) -> &[f64] {
        // Every constructor yields standard layout, so the view always exists.
        self.data.as_slice().unwrap_or(&[])
    }

    /// Mutable row-major view of the entries.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data.as_slice_mut().unwrap_or(&mut [])
    }

    /// Consumes the tensor and returns its entries.
    pub fn into_vec(self) -> Vec<f64> {
        self.data.into_raw_vec()
    }

    /// Sets every entry to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Overwrites every entry with a standard normal sample.
    pub fn fill_randn<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.data
            .iter_mut()
            .for_each(|x| *x = rng.sample(StandardNormal));
    }

    /// Applies `f` to every entry.
    pub fn map<F: FnMut(f64) -> f64>(&self, f: F) -> Self {
        Self::from(self.data.mapv(f))
    }

    /// Combines two tensors of identical shape entry by entry.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the shapes differ.
    pub fn zip_map<F: FnMut(f64, f64) -> f64>(&self, other: &Self, mut f: F) -> Result<Self> {
        self.expect_shape(other.shape())?;
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| f(a, b));
        Ok(Self::from(data))
    }

    /// Multiplies every entry by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self::from(&self.data * factor)
    }

    /// Frobenius norm over all entries.
    pub fn norm(&self) -> f64 {
        self.data.fold(0.0, |acc, x| acc + x * x).sqrt()
    }

    /// Sum of all entries.
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// Euclidean inner product over all entries.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the shapes differ.
    pub fn dot(&self, other: &Self) -> Result<f64> {
        self.expect_shape(other.shape())?;
        Ok(Zip::from(&self.data)
            .and(&other.data)
            .fold(0.0, |acc, a, b| acc + a * b))
    }

    /// Largest absolute entry-wise difference, or infinity if shapes differ.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        if self.shape() != other.shape() {
            return f64::INFINITY;
        }
        Zip::from(&self.data)
            .and(&other.data)
            .fold(0.0, |acc, a, b| acc.max((a - b).abs()))
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Checks that the tensor has exactly the given shape.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` otherwise.
    pub fn expect_shape(&self, shape: &[usize]) -> Result<()> {
        if self.shape() == shape {
            Ok(())
        } else {
            Err(TrivializationError::shape_mismatch(
                format_shape(shape),
                format_shape(self.shape()),
            ))
        }
    }

    /// Leading axes once the trailing `structured` axes are removed.
    pub fn batch_shape(&self, structured: usize) -> &[usize] {
        let shape = self.shape();
        &shape[..shape.len().saturating_sub(structured)]
    }

    fn vector_len(&self) -> usize {
        self.shape().last().copied().unwrap_or(1)
    }

    fn matrix_dims(&self) -> (usize, usize) {
        match *self.shape() {
            [] => (1, 1),
            [c] => (1, c),
            [.., r, c] => (r, c),
        }
    }

    /// Number of vectors along the last axis.
    pub fn num_vectors(&self) -> usize {
        self.batch_shape(1).iter().product()
    }

    /// Number of matrices spanned by the last two axes.
    pub fn num_matrices(&self) -> usize {
        self.batch_shape(2).iter().product()
    }

    fn batch_item(&self, structured: usize, i: usize) -> ArrayViewD<'_, f64> {
        unravel(i, self.batch_shape(structured))
            .into_iter()
            .fold(self.data.view(), |view, k| view.index_axis_move(Axis(0), k))
    }

    fn batch_item_mut(&mut self, structured: usize, i: usize) -> ArrayViewMutD<'_, f64> {
        let index = unravel(i, self.batch_shape(structured));
        index
            .into_iter()
            .fold(self.data.view_mut(), |view, k| view.index_axis_move(Axis(0), k))
    }

    /// The `i`-th vector along the last axis.
    pub fn vector(&self, i: usize) -> DVector<f64> {
        let item = self.batch_item(1, i);
        DVector::from_iterator(item.len(), item.iter().copied())
    }

    /// Overwrites the `i`-th vector along the last axis.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `v` has the wrong length.
    pub fn set_vector(&mut self, i: usize, v: &DVector<f64>) -> Result<()> {
        let n = self.vector_len();
        if v.len() != n {
            return Err(TrivializationError::shape_mismatch(
                format!("vector of length {n}"),
                format!("vector of length {}", v.len()),
            ));
        }
        let mut item = self.batch_item_mut(1, i);
        item.iter_mut().zip(v.iter()).for_each(|(x, &y)| *x = y);
        Ok(())
    }

    /// The `i`-th matrix spanned by the last two axes.
    pub fn matrix(&self, i: usize) -> DMatrix<f64> {
        let (r, c) = self.matrix_dims();
        DMatrix::from_row_iterator(r, c, self.batch_item(2, i).iter().copied())
    }

    /// Overwrites the `i`-th matrix spanned by the last two axes.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `m` has the wrong dimensions.
    pub fn set_matrix(&mut self, i: usize, m: &DMatrix<f64>) -> Result<()> {
        let (r, c) = self.matrix_dims();
        if m.shape() != (r, c) {
            return Err(TrivializationError::shape_mismatch(
                format!("{r}x{c} matrix"),
                format!("{}x{} matrix", m.nrows(), m.ncols()),
            ));
        }
        // nalgebra is column-major; the transpose walks `m` row by row.
        let rows = m.transpose();
        let mut item = self.batch_item_mut(2, i);
        item.iter_mut().zip(rows.iter()).for_each(|(x, &y)| *x = y);
        Ok(())
    }

    /// Maps every vector of the batch through `f`, producing vectors of length `n`.
    ///
    /// `f` receives the batch index so that per-element state (a base point,
    /// for instance) can be looked up.
    ///
    /// # Errors
    /// Propagates errors from `f` and fails with `ShapeMismatch` when `f`
    /// returns a vector of the wrong length.
    pub fn try_map_vectors<F>(&self, n: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, DVector<f64>) -> Result<DVector<f64>>,
    {
        let mut shape = self.batch_shape(1).to_vec();
        shape.push(n);
        let width = self.vector_len();
        let rows = self
            .data
            .view()
            .into_shape((self.num_vectors(), width))
            .map_err(reshape_error(self.shape()))?;
        let mut out = Vec::with_capacity(self.num_vectors() * n);
        for (i, row) in rows.outer_iter().enumerate() {
            let v = f(i, DVector::from_iterator(width, row.iter().copied()))?;
            if v.len() != n {
                return Err(TrivializationError::shape_mismatch(
                    format!("vector of length {n}"),
                    format!("vector of length {}", v.len()),
                ));
            }
            out.extend(v.iter().copied());
        }
        Self::from_vec(&shape, out)
    }

    /// Maps every matrix of the batch through `f`, producing `rows x cols` matrices.
    ///
    /// # Errors
    /// Propagates errors from `f` and fails with `ShapeMismatch` when `f`
    /// returns a matrix of the wrong dimensions.
    pub fn try_map_matrices<F>(&self, rows: usize, cols: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, DMatrix<f64>) -> Result<DMatrix<f64>>,
    {
        let mut shape = self.batch_shape(2).to_vec();
        shape.extend([rows, cols]);
        let (r, c) = self.matrix_dims();
        let blocks: ArrayView3<'_, f64> = self
            .data
            .view()
            .into_shape((self.num_matrices(), r, c))
            .map_err(reshape_error(self.shape()))?;
        let mut out = Vec::with_capacity(self.num_matrices() * rows * cols);
        for (i, block) in blocks.outer_iter().enumerate() {
            let m = f(i, DMatrix::from_row_iterator(r, c, block.iter().copied()))?;
            if m.shape() != (rows, cols) {
                return Err(TrivializationError::shape_mismatch(
                    format!("{rows}x{cols} matrix"),
                    format!("{}x{} matrix", m.nrows(), m.ncols()),
                ));
            }
            out.extend(m.transpose().iter().copied());
        }
        Self::from_vec(&shape, out)
    }
}

impl From<ArrayD<f64>> for Tensor {
    fn from(data: ArrayD<f64>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{}", format_shape(self.shape()))
    }
}
