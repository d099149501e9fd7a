//! Symmetric matrices `Aᵀ = A`.

use crate::utils::{
    split_square_size, symmetric_from_triangle, symmetric_from_triangle_pullback, with_dims,
};
use geotriv_core::{Description, Manifold, Registration, Result, Signature, Value};
use rand::RngCore;

/// The vector space of `n x n` symmetric matrices.
///
/// Reads the lower triangle `L` (diagonal included) and returns
/// `L + L₋ᵀ`, where `L₋` is its strict part.
#[derive(Debug)]
pub struct Symmetric {
    batch: Vec<usize>,
    n: usize,
    lower: bool,
    registration: Registration,
}

impl Symmetric {
    /// Symmetric matrices of shape `(.., n, n)` read from the lower triangle.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_triangle(size, true)
    }

    /// Like [`Symmetric::new`], choosing which triangle carries the parameters.
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

impl Manifold for Symmetric {
    fn name(&self) -> &str {
        "Symmetric"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x.as_tensor()?.try_map_matrices(self.n, self.n, |_, m| {
            Ok(symmetric_from_triangle(&m, self.lower))
        })?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let out = grad.as_tensor()?.try_map_matrices(self.n, self.n, |_, g| {
            Ok(symmetric_from_triangle_pullback(&g, self.lower))
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
                (&m - m.transpose()).amax() <= tol
            })
    }

    fn describe(&self) -> Description {
        Description::new("Symmetric")
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
