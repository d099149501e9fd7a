//! Linear-algebra helpers shared by the matrix manifolds.
//!
//! Every map that appears inside a trivialization comes with its pullback
//! (vector-Jacobian product) so that the manifolds can differentiate through
//! it without an autodiff tape.

use geotriv_core::stability::sign_or_one;
use geotriv_core::{Result, TrivializationError};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

/// Entries with `j - i <= k` (lower triangle from the `k`-th diagonal).
pub fn tril(x: &DMatrix<f64>, k: isize) -> DMatrix<f64> {
    DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
        if (j as isize) - (i as isize) <= k {
            x[(i, j)]
        } else {
            0.0
        }
    })
}

/// Entries with `j - i >= k` (upper triangle from the `k`-th diagonal).
pub fn triu(x: &DMatrix<f64>, k: isize) -> DMatrix<f64> {
    DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
        if (j as isize) - (i as isize) >= k {
            x[(i, j)]
        } else {
            0.0
        }
    })
}

/// Symmetric part `(X + Xᵀ) / 2`.
pub fn sym(x: &DMatrix<f64>) -> DMatrix<f64> {
    (x + x.transpose()) * 0.5
}

/// Skew-symmetric matrix built from the strict lower (or upper) triangle.
pub fn skew_from_triangle(x: &DMatrix<f64>, lower: bool) -> DMatrix<f64> {
    let t = if lower { tril(x, -1) } else { triu(x, 1) };
    &t - t.transpose()
}

/// Pullback of [`skew_from_triangle`].
pub fn skew_from_triangle_pullback(grad: &DMatrix<f64>, lower: bool) -> DMatrix<f64> {
    let g = grad - grad.transpose();
    if lower {
        tril(&g, -1)
    } else {
        triu(&g, 1)
    }
}

/// Symmetric matrix built from the lower (or upper) triangle, diagonal included.
pub fn symmetric_from_triangle(x: &DMatrix<f64>, lower: bool) -> DMatrix<f64> {
    if lower {
        tril(x, 0) + tril(x, -1).transpose()
    } else {
        triu(x, 0) + triu(x, 1).transpose()
    }
}

/// Pullback of [`symmetric_from_triangle`].
pub fn symmetric_from_triangle_pullback(grad: &DMatrix<f64>, lower: bool) -> DMatrix<f64> {
    let off = grad + grad.transpose();
    let diag = DMatrix::from_diagonal(&grad.diagonal());
    if lower {
        tril(&off, -1) + diag
    } else {
        triu(&off, 1) + diag
    }
}

/// Matrix exponential.
pub fn expm(a: &DMatrix<f64>) -> DMatrix<f64> {
    a.exp()
}

/// Pullback of [`expm`].
///
/// `Dexp(A)ᵀ[G] = Dexp(Aᵀ)[G]`, and the Fréchet derivative `Dexp(M)[E]` is
/// the top-right block of `exp([[M, E], [0, M]])`.
pub fn expm_pullback(a: &DMatrix<f64>, grad: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows();
    let at = a.transpose();
    let mut block = DMatrix::zeros(2 * n, 2 * n);
    block.view_mut((0, 0), (n, n)).copy_from(&at);
    block.view_mut((0, n), (n, n)).copy_from(grad);
    block.view_mut((n, n), (n, n)).copy_from(&at);
    block.exp().view((0, n), (n, n)).into_owned()
}

/// Cayley map `(I - A/2)⁻¹ (I + A/2)`.
pub fn cayley(a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = a.nrows();
    let id = DMatrix::<f64>::identity(n, n);
    let half = a * 0.5;
    (&id - &half)
        .lu()
        .solve(&(&id + &half))
        .ok_or_else(|| TrivializationError::numerical("Cayley map of a singular matrix"))
}

/// Pullback of [`cayley`]: `(I - A/2)⁻ᵀ G (I + Y)ᵀ / 2` with `Y = cayley(A)`.
pub fn cayley_pullback(a: &DMatrix<f64>, grad: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = a.nrows();
    let id = DMatrix::<f64>::identity(n, n);
    let y = cayley(a)?;
    let m_t = (&id - a * 0.5).transpose();
    let rhs = grad * (&id + y).transpose() * 0.5;
    m_t.lu()
        .solve(&rhs)
        .ok_or_else(|| TrivializationError::numerical("Cayley pullback of a singular matrix"))
}

/// Reduced QR decomposition with a non-negative diagonal in `R`.
///
/// Requires `nrows >= ncols`. The signs of `diag(R)` are absorbed into the
/// columns of `Q`, which makes the decomposition unique for full-rank input.
pub fn qr_positive(a: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
    let qr = a.clone().qr();
    let mut q = qr.q();
    let mut r = qr.r();
    for j in 0..r.nrows() {
        let s = sign_or_one(r[(j, j)]);
        if s < 0.0 {
            q.column_mut(j).neg_mut();
            r.row_mut(j).neg_mut();
        }
    }
    (q, r)
}

/// The `Q` factor of [`qr_positive`].
pub fn qf(a: &DMatrix<f64>) -> DMatrix<f64> {
    qr_positive(a).0
}

/// Pullback of [`qf`] for a full-rank tall matrix.
///
/// With `M = -Q̄ᵀQ` and `S` the symmetric matrix sharing the lower triangle of
/// `M`, the adjoint is `Ā = (Q̄ + Q S) R⁻ᵀ`.
pub fn qf_pullback(a: &DMatrix<f64>, grad: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (q, r) = qr_positive(a);
    let m = -(grad.transpose() * &q);
    let s = tril(&m, 0) + tril(&m, -1).transpose();
    let w = grad + &q * s;
    r.solve_upper_triangular(&w.transpose())
        .map(|t| t.transpose())
        .ok_or_else(|| TrivializationError::numerical("QR pullback with a singular R factor"))
}

/// Matrix with independent standard normal entries.
pub fn randn_matrix<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

/// Vector with independent standard normal entries.
pub fn randn_vector<R: Rng + ?Sized>(n: usize, rng: &mut R) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.sample(StandardNormal))
}

/// Sample from the Haar measure on the Stiefel manifold St(n, k), `n >= k`.
pub fn haar_stiefel<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> DMatrix<f64> {
    qf(&randn_matrix(n, k, rng))
}

/// Sample from the Haar measure on O(n).
pub fn haar_orthogonal<R: Rng + ?Sized>(n: usize, rng: &mut R) -> DMatrix<f64> {
    haar_stiefel(n, n, rng)
}

/// Sample from the Haar measure on SO(n).
pub fn haar_special_orthogonal<R: Rng + ?Sized>(n: usize, rng: &mut R) -> DMatrix<f64> {
    let mut q = haar_orthogonal(n, rng);
    if q.determinant() < 0.0 {
        q.column_mut(0).neg_mut();
    }
    q
}

/// Largest entry of `|XᵀX - I|`.
pub fn orthogonality_error(x: &DMatrix<f64>) -> f64 {
    let k = x.ncols();
    (x.transpose() * x - DMatrix::<f64>::identity(k, k)).amax()
}

/// Splits a vector-manifold size `(.., n)` into tensorial size and `n`.
pub fn split_vector_size(size: &[usize]) -> Result<(Vec<usize>, usize)> {
    match size.split_last() {
        Some((&n, batch)) if n > 0 && batch.iter().all(|&b| b > 0) => Ok((batch.to_vec(), n)),
        _ => Err(TrivializationError::invalid_parameter(
            "size",
            format!("expected a shape (.., n) with positive dimensions, got {size:?}"),
        )),
    }
}

/// Splits a matrix-manifold size `(.., n, k)` into tensorial size, `n` and `k`.
pub fn split_matrix_size(size: &[usize]) -> Result<(Vec<usize>, usize, usize)> {
    if size.len() < 2 || size.iter().any(|&d| d == 0) {
        return Err(TrivializationError::invalid_parameter(
            "size",
            format!("expected a shape (.., n, k) with positive dimensions, got {size:?}"),
        ));
    }
    let (batch, tail) = size.split_at(size.len() - 2);
    Ok((batch.to_vec(), tail[0], tail[1]))
}

/// Like [`split_matrix_size`] for manifolds of square matrices.
pub fn split_square_size(size: &[usize]) -> Result<(Vec<usize>, usize)> {
    let (batch, n, k) = split_matrix_size(size)?;
    if n != k {
        return Err(TrivializationError::invalid_parameter(
            "size",
            format!("expected square matrices, got {n}x{k}"),
        ));
    }
    Ok((batch, n))
}

/// Appends trailing dimensions to a tensorial size.
pub fn with_dims(batch: &[usize], dims: &[usize]) -> Vec<usize> {
    let mut shape = batch.to_vec();
    shape.extend_from_slice(dims);
    shape
}
