//! Positive semidefinite and positive definite matrices.
//!
//! All four manifolds are `Q diag(f(L)) Qᵀ` with `Q` on a Stiefel manifold.
//! `PSSD` and `PSD` are the full-rank cases of `PSSDLowRank` and
//! `PSSDFixedRank`.

use crate::factorized::{
    all_matrices, asymmetry, check_rank, numerical_rank, symmetric_eigenvalues,
    symmetric_fibration,
};
use crate::fibered::Fibration;
use crate::spectral::{DiagonalMap, PositiveMap};
use crate::utils::split_square_size;
use geotriv_core::{Description, Result, Value};
use nalgebra::DMatrix;

/// Eigenvalues of `m` if it is symmetric up to `tol`, relative to its scale.
fn eigenvalues_if_symmetric(m: DMatrix<f64>, tol: f64) -> Option<(Vec<f64>, f64)> {
    let scale = m.amax().max(1.0);
    if asymmetry(&m) > tol * scale {
        return None;
    }
    Some((symmetric_eigenvalues(m), scale))
}

fn is_semidefinite(m: DMatrix<f64>, max_rank: usize, tol: f64) -> bool {
    let Some((lambda, scale)) = eigenvalues_if_symmetric(m, tol) else {
        return false;
    };
    let magnitudes: Vec<f64> = lambda.iter().rev().map(|l| l.abs()).collect();
    lambda.iter().all(|&l| l >= -tol * scale) && numerical_rank(&magnitudes, tol) <= max_rank
}

fn is_definite_on_rank(m: DMatrix<f64>, rank: usize, tol: f64) -> bool {
    let Some((lambda, scale)) = eigenvalues_if_symmetric(m, tol) else {
        return false;
    };
    let positive = lambda.iter().filter(|&&l| l > tol * scale).count();
    lambda.iter().all(|&l| l >= -tol * scale) && positive == rank
}

fn semidefinite(
    name: &str,
    size: &[usize],
    rank: Option<usize>,
    map: DiagonalMap,
) -> Result<(usize, Fibration)> {
    let (batch, n) = split_square_size(size)?;
    let rank = rank.unwrap_or(n);
    check_rank(rank, n, n)?;
    let mut description = Description::new(name).field("n", n);
    if name.ends_with("Rank") {
        description = description.field("rank", rank);
    }
    if let DiagonalMap::Positive(f) = map {
        description = description.field("f", f);
    }
    let inner = symmetric_fibration(&batch, n, rank, map)?
        .named(name, description.tensorial_size(&batch));
    Ok((rank, inner))
}

/// Symmetric positive semidefinite matrices of rank at most `r`, `Q diag(|L|) Qᵀ`.
#[derive(Debug)]
pub struct PSSDLowRank {
    shape: Vec<usize>,
    rank: usize,
    inner: Fibration,
}

impl PSSDLowRank {
    /// Shape `(.., n, n)` and maximal rank `rank`.
    pub fn new(size: &[usize], rank: usize) -> Result<Self> {
        let (rank, inner) = semidefinite("PSSDLowRank", size, Some(rank), DiagonalMap::Abs)?;
        Ok(Self {
            shape: size.to_vec(),
            rank,
            inner,
        })
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| is_semidefinite(m, self.rank, tol))
    }
}

delegate_to_fibration!(PSSDLowRank);

/// Symmetric positive semidefinite matrices of rank exactly `r`,
/// `Q diag(f(L) + ε) Qᵀ`.
#[derive(Debug)]
pub struct PSSDFixedRank {
    shape: Vec<usize>,
    rank: usize,
    inner: Fibration,
}

impl PSSDFixedRank {
    /// Shape `(.., n, n)`, rank `rank` and the softplus map.
    pub fn new(size: &[usize], rank: usize) -> Result<Self> {
        Self::with_map(size, rank, PositiveMap::Softplus)
    }

    /// With a named map, `"softplus"` or `"exp"`.
    pub fn with_trivialization(size: &[usize], rank: usize, f: &str) -> Result<Self> {
        Self::with_map(size, rank, f.parse()?)
    }

    /// With the given positive map.
    pub fn with_map(size: &[usize], rank: usize, f: PositiveMap) -> Result<Self> {
        let (rank, inner) =
            semidefinite("PSSDFixedRank", size, Some(rank), DiagonalMap::Positive(f))?;
        Ok(Self {
            shape: size.to_vec(),
            rank,
            inner,
        })
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| is_definite_on_rank(m, self.rank, tol))
    }
}

delegate_to_fibration!(PSSDFixedRank);

/// Symmetric positive semidefinite matrices.
#[derive(Debug)]
pub struct PSSD {
    shape: Vec<usize>,
    n: usize,
    inner: Fibration,
}

impl PSSD {
    /// Shape `(.., n, n)`.
    pub fn new(size: &[usize]) -> Result<Self> {
        let (n, inner) = semidefinite("PSSD", size, None, DiagonalMap::Abs)?;
        Ok(Self {
            shape: size.to_vec(),
            n,
            inner,
        })
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| is_semidefinite(m, self.n, tol))
    }
}

delegate_to_fibration!(PSSD);

/// Symmetric positive definite matrices.
#[derive(Debug)]
pub struct PSD {
    shape: Vec<usize>,
    n: usize,
    inner: Fibration,
}

impl PSD {
    /// Shape `(.., n, n)` with the softplus map.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_map(size, PositiveMap::Softplus)
    }

    /// With a named map, `"softplus"` or `"exp"`.
    pub fn with_trivialization(size: &[usize], f: &str) -> Result<Self> {
        Self::with_map(size, f.parse()?)
    }

    /// With the given positive map.
    pub fn with_map(size: &[usize], f: PositiveMap) -> Result<Self> {
        let (n, inner) = semidefinite("PSD", size, None, DiagonalMap::Positive(f))?;
        Ok(Self {
            shape: size.to_vec(),
            n,
            inner,
        })
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| is_definite_on_rank(m, self.n, tol))
    }
}

delegate_to_fibration!(PSD);
