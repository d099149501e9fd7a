//! GL⁺(n), invertible matrices with positive determinant.

use crate::factorized::{all_matrices, factorized_fibration, Frames};
use crate::fibered::Fibration;
use crate::spectral::{DiagonalMap, PositiveMap};
use crate::utils::split_square_size;
use geotriv_core::{Description, Result, Value};

/// `U diag(f(S) + ε) Vᵀ` with `U, V ∈ SO(n)`, so `det > 0`.
#[derive(Debug)]
pub struct GLp {
    shape: Vec<usize>,
    inner: Fibration,
}

impl GLp {
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
        let (batch, n) = split_square_size(size)?;
        let description = Description::new("GLp")
            .field("n", n)
            .field("f", f)
            .tensorial_size(&batch);
        let inner =
            factorized_fibration(&batch, n, n, n, DiagonalMap::Positive(f), Frames::Rotations)?
                .named("GLp", description);
        Ok(Self {
            shape: size.to_vec(),
            inner,
        })
    }

    fn is_member(&self, value: &Value, _tol: f64) -> bool {
        all_matrices(value, &self.shape, |m| m.determinant() > 0.0)
    }
}

delegate_to_fibration!(GLp);

#[cfg(test)]
mod tests {
    use super::*;
    use geotriv_core::test_utils::random_pullback_error;
    use geotriv_core::{new_storage, Manifold, Tensor};
    use nalgebra::DMatrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    #[test]
    fn test_positive_determinant() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut m = GLp::new(&[4, 3, 3]).unwrap();
        let storage = new_storage(Tensor::randn(&[4, 3, 3], &mut rng));
        m.register(Rc::clone(&storage)).unwrap();
        assert!(m.contains(&m.evaluate().unwrap(), 1e-10));
        m.uniform_init(&mut rng).unwrap();
        assert!(m.contains(&m.evaluate().unwrap(), 1e-10));

        let reflection = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![-1.0, 1.0, 1.0]));
        let negative = Tensor::from_matrices(&[], 3, 3, &[reflection]).unwrap();
        assert!(!GLp::new(&[3, 3]).unwrap().contains(&negative.into(), 1e-10));
    }

    #[test]
    fn test_pullback() {
        let mut rng = StdRng::seed_from_u64(1);
        let m = GLp::with_trivialization(&[3, 3], "exp").unwrap();
        assert!(random_pullback_error(&m, &mut rng, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_square_only() {
        assert!(GLp::new(&[3, 4]).unwrap_err().is_configuration());
    }
}
