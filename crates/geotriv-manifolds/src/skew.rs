//! Skew-symmetric matrices `Aᵀ = -A`.

use crate::utils::{
    skew_from_triangle, skew_from_triangle_pullback, split_square_size, with_dims,
};
use geotriv_core::{Description, Manifold, Registration, Result, Signature, Value};
use rand::RngCore;

/// The vector space of `n x n` skew-symmetric matrices.
///
/// The trivialization reads the strict lower triangle `L` of the ambient
/// matrix (or the strict upper one) and returns `L - Lᵀ`.
#[derive(Debug)]
pub struct Skew {
    batch: Vec<usize>,
    n: usize,
    lower: bool,
    registration: Registration,
}

impl Skew {
    /// Skew-symmetric matrices of shape `(.., n, n)` read from the lower triangle.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_triangle(size, true)
    }

    /// Like [`Skew::new`], choosing which triangle carries the parameters.
    pub fn with_triangle(size: &[usize], lower: bool) -> Result<Self> {
        let (batch, n) = split_square_size(size)?;
        Ok(Self {
            batch,
            n,
            lower,
            registration: Registration::new(),
        })
    }

    fn shape(&self) -> Vec<usize> {
        with_dims(&self.batch, &[self.n, self.n])
    }
}

impl Manifold for Skew {
    fn name(&self) -> &str {
        "Skew"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x
            .as_tensor()?
            .try_map_matrices(self.n, self.n, |_, m| Ok(skew_from_triangle(&m, self.lower)))?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let out = grad.as_tensor()?.try_map_matrices(self.n, self.n, |_, g| {
            Ok(skew_from_triangle_pullback(&g, self.lower))
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        if let Some(value) = storage {
            value.as_tensor_mut()?.fill_randn(rng);
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        let Ok(t) = value.as_tensor() else {
            return false;
        };
        t.shape() == self.shape().as_slice()
            && (0..t.num_matrices()).all(|i| {
                let m = t.matrix(i);
                (&m + m.transpose()).amax() <= tol
            })
    }

    fn describe(&self) -> Description {
        Description::new("Skew")
            .field("n", self.n)
            .field("triv", if self.lower { "lower" } else { "upper" })
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotriv_core::test_utils::random_pullback_error;
    use geotriv_core::Tensor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_is_skew() {
        let mut rng = StdRng::seed_from_u64(0);
        for lower in [true, false] {
            let m = Skew::with_triangle(&[3, 4, 4], lower).unwrap();
            let x: Value = Tensor::randn(&[3, 4, 4], &mut rng).into();
            let y = m.forward(&x).unwrap();
            assert!(m.contains(&y, 1e-14));
            assert!(random_pullback_error(&m, &mut rng, 1e-6).unwrap() < 1e-8);
        }
    }

    #[test]
    fn test_rejects_rectangular() {
        assert!(Skew::new(&[3, 4]).is_err());
    }
}
