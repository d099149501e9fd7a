//! Matrices whose singular values lie in `[1 - λ, 1 + λ]`.

use crate::factorized::{all_matrices, factorized_fibration, singular_values, Frames};
use crate::fibered::Fibration;
use crate::spectral::{BoundedMap, DiagonalMap};
use crate::utils::split_matrix_size;
use geotriv_core::{Description, Result, TrivializationError, Value};

/// `U diag(1 + λ f(S)) Vᵀ` with `f` bounded by one, at full rank `min(n, k)`.
///
/// With `λ = 0` every output has orthonormal columns (or rows).
#[derive(Debug)]
pub struct AlmostOrthogonal {
    shape: Vec<usize>,
    lambda: f64,
    inner: Fibration,
}

impl AlmostOrthogonal {
    /// Shape `(.., n, k)`, radius `lambda` and the sigmoid map.
    pub fn new(size: &[usize], lambda: f64) -> Result<Self> {
        Self::with_map(size, lambda, BoundedMap::Sigmoid)
    }

    /// With a named map, `"sigmoid"`, `"tanh"` or `"sin"`.
    pub fn with_trivialization(size: &[usize], lambda: f64, f: &str) -> Result<Self> {
        Self::with_map(size, lambda, f.parse()?)
    }

    /// With the given bounded map.
    ///
    /// # Errors
    /// `InvalidParameter` if `lambda` is not in `[0, 1]`.
    pub fn with_map(size: &[usize], lambda: f64, f: BoundedMap) -> Result<Self> {
        if !(0.0..=1.0).contains(&lambda) {
            return Err(TrivializationError::invalid_parameter(
                "lambda",
                format!("expected a value in [0, 1], got {lambda}"),
            ));
        }
        let (batch, n, k) = split_matrix_size(size)?;
        let description = Description::new("AlmostOrthogonal")
            .field("n", n)
            .field("k", k)
            .field("lambda", lambda)
            .field("f", f)
            .tensorial_size(&batch);
        let map = DiagonalMap::NearOne { map: f, lambda };
        let inner = factorized_fibration(&batch, n, k, n.min(k), map, Frames::Stiefel)?
            .named("AlmostOrthogonal", description);
        Ok(Self {
            shape: size.to_vec(),
            lambda,
            inner,
        })
    }

    /// The radius `λ`.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        let (low, high) = (1.0 - self.lambda - tol, 1.0 + self.lambda + tol);
        all_matrices(value, &self.shape, |m| {
            singular_values(m).iter().all(|s| (low..=high).contains(s))
        })
    }
}

delegate_to_fibration!(AlmostOrthogonal);

#[cfg(test)]
mod tests {
    use super::*;
    use geotriv_core::test_utils::random_pullback_error;
    use geotriv_core::{Manifold, Tensor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_singular_values_stay_in_band() {
        let mut rng = StdRng::seed_from_u64(0);
        for f in BoundedMap::NAMES {
            let m = AlmostOrthogonal::with_trivialization(&[2, 5, 3], 0.3, f).unwrap();
            let x: Value = Tensor::randn(&[2, 5, 3], &mut rng).scale(4.0).into();
            assert!(m.contains(&m.forward(&x).unwrap(), 1e-10));
        }
    }

    #[test]
    fn test_zero_lambda_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(1);
        let m = AlmostOrthogonal::new(&[3, 4], 0.0).unwrap();
        let x: Value = Tensor::randn(&[3, 4], &mut rng).into();
        let y = m.forward(&x).unwrap().into_tensor().unwrap().matrix(0);
        let gram = &y * y.transpose();
        assert!((gram - nalgebra::DMatrix::<f64>::identity(3, 3)).amax() < 1e-10);
    }

    #[test]
    fn test_pullback() {
        let mut rng = StdRng::seed_from_u64(2);
        let m = AlmostOrthogonal::with_trivialization(&[4, 3], 0.5, "tanh").unwrap();
        assert!(random_pullback_error(&m, &mut rng, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_lambda_range() {
        assert!(AlmostOrthogonal::new(&[3, 3], 1.5).is_err());
        assert!(AlmostOrthogonal::new(&[3, 3], -0.1).is_err());
        assert!(AlmostOrthogonal::new(&[3, 3], f64::NAN).is_err());
        assert!(AlmostOrthogonal::new(&[3, 3], 1.0).is_ok());
        assert!(AlmostOrthogonal::with_trivialization(&[3, 3], 0.5, "relu").is_err());
    }
}
