//! Matrices of bounded and of fixed rank.

use crate::factorized::{
    all_matrices, check_rank, factorized_fibration, numerical_rank, singular_values, Frames,
};
use crate::fibered::Fibration;
use crate::spectral::{DiagonalMap, PositiveMap};
use crate::utils::split_matrix_size;
use geotriv_core::{Description, Result, Value};

/// `n x k` matrices of rank at most `r`, as `U diag(S) Vᵀ`.
///
/// # Canonical initialisation
///
/// The Stiefel bases of `U` and `V` are resampled from the Haar measure and
/// `S` is drawn from N(0, 1).
#[derive(Debug)]
pub struct LowRank {
    shape: Vec<usize>,
    rank: usize,
    inner: Fibration,
}

impl LowRank {
    /// Matrices of shape `(.., n, k)` with rank at most `rank`.
    ///
    /// # Errors
    /// `InvalidParameter` unless `1 <= rank <= min(n, k)`.
    pub fn new(size: &[usize], rank: usize) -> Result<Self> {
        let (batch, n, k) = split_matrix_size(size)?;
        check_rank(rank, n, k)?;
        let description = Description::new("LowRank")
            .field("n", n)
            .field("k", k)
            .field("rank", rank)
            .tensorial_size(&batch);
        let inner = factorized_fibration(&batch, n, k, rank, DiagonalMap::Identity, Frames::Stiefel)?
            .named("LowRank", description);
        Ok(Self {
            shape: size.to_vec(),
            rank,
            inner,
        })
    }

    /// The maximal rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The underlying fibration.
    pub fn fibration(&self) -> &Fibration {
        &self.inner
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| {
            numerical_rank(&singular_values(m), tol) <= self.rank
        })
    }
}

delegate_to_fibration!(LowRank);

/// `n x k` matrices of rank exactly `r`, as `U diag(f(S) + ε) Vᵀ`.
#[derive(Debug)]
pub struct FixedRank {
    shape: Vec<usize>,
    rank: usize,
    inner: Fibration,
}

impl FixedRank {
    /// Rank-`rank` matrices of shape `(.., n, k)` with the softplus map.
    pub fn new(size: &[usize], rank: usize) -> Result<Self> {
        Self::with_map(size, rank, PositiveMap::Softplus)
    }

    /// Rank-`rank` matrices with a named map, `"softplus"` or `"exp"`.
    pub fn with_trivialization(size: &[usize], rank: usize, f: &str) -> Result<Self> {
        Self::with_map(size, rank, f.parse()?)
    }

    /// Rank-`rank` matrices with the given positive map.
    ///
    /// # Errors
    /// `InvalidParameter` unless `1 <= rank <= min(n, k)`.
    pub fn with_map(size: &[usize], rank: usize, f: PositiveMap) -> Result<Self> {
        let (batch, n, k) = split_matrix_size(size)?;
        check_rank(rank, n, k)?;
        let description = Description::new("FixedRank")
            .field("n", n)
            .field("k", k)
            .field("rank", rank)
            .field("f", f)
            .tensorial_size(&batch);
        let inner =
            factorized_fibration(&batch, n, k, rank, DiagonalMap::Positive(f), Frames::Stiefel)?
                .named("FixedRank", description);
        Ok(Self {
            shape: size.to_vec(),
            rank,
            inner,
        })
    }

    /// The rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| {
            numerical_rank(&singular_values(m), tol) == self.rank
        })
    }
}

delegate_to_fibration!(FixedRank);

#[cfg(test)]
mod tests {
    use super::*;
    use geotriv_core::test_utils::random_pullback_error;
    use geotriv_core::{new_storage, Manifold, Tensor};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    #[test]
    fn test_rank_is_bounded() {
        let mut rng = StdRng::seed_from_u64(0);
        for size in [vec![5, 4], vec![2, 3, 6]] {
            let m = LowRank::new(&size, 2).unwrap();
            let x: Value = Tensor::randn(&size, &mut rng).into();
            let y = m.forward(&x).unwrap();
            assert!(m.contains(&y, 1e-10));
            let full: Value = Tensor::randn(&size, &mut rng).into();
            assert!(!m.contains(&full, 1e-10));
        }
    }

    #[test]
    fn test_fixed_rank_after_init() {
        let mut rng = StdRng::seed_from_u64(1);
        for f in ["softplus", "exp"] {
            let mut m = FixedRank::with_trivialization(&[4, 3], 2, f).unwrap();
            let storage = new_storage(Tensor::randn(&[4, 3], &mut rng));
            m.register(Rc::clone(&storage)).unwrap();
            m.uniform_init(&mut rng).unwrap();
            let y = m.evaluate().unwrap();
            assert!(m.contains(&y, 1e-10));
            let low = LowRank::new(&[4, 3], 1).unwrap();
            assert!(!low.contains(&y, 1e-10));
        }
    }

    #[test]
    fn test_pullbacks() {
        let mut rng = StdRng::seed_from_u64(2);
        let low = LowRank::new(&[4, 3], 2).unwrap();
        assert!(random_pullback_error(&low, &mut rng, 1e-6).unwrap() < 1e-6);
        let fixed = FixedRank::new(&[3, 4], 2).unwrap();
        assert!(random_pullback_error(&fixed, &mut rng, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_configuration() {
        assert!(LowRank::new(&[4, 3], 4).is_err());
        assert!(LowRank::new(&[4, 3], 0).is_err());
        assert!(FixedRank::with_trivialization(&[4, 3], 2, "relu").is_err());
        let m = FixedRank::new(&[2, 4, 3], 2).unwrap();
        assert_eq!(
            m.describe().to_string(),
            "FixedRank(n=4, k=3, rank=2, f=softplus, tensorial_size=(2))"
        );
        assert_eq!(m.rank(), 2);
        assert_eq!(LowRank::new(&[4, 3], 2).unwrap().fibration().len(), 3);
    }
}
