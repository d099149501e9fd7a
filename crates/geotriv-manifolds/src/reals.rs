//! The unconstrained Euclidean space ℝⁿ.

use crate::utils::split_vector_size;
use geotriv_core::{Description, Manifold, Registration, Result, Signature, Value};
use rand::RngCore;

/// Euclidean space with the identity trivialization.
///
/// Mostly useful as a component of products, e.g. the singular values of a
/// low-rank factorisation.
#[derive(Debug)]
pub struct Rn {
    size: Vec<usize>,
    registration: Registration,
}

impl Rn {
    /// Creates ℝⁿ with shape `(.., n)`.
    pub fn new(size: &[usize]) -> Result<Self> {
        split_vector_size(size)?;
        Ok(Self {
            size: size.to_vec(),
            registration: Registration::new(),
        })
    }
}

impl Manifold for Rn {
    fn name(&self) -> &str {
        "Rn"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn output_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        Ok(x.clone())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        Ok(grad.clone())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        if let Some(value) = storage {
            value.as_tensor_mut()?.fill_randn(rng);
        }
        Ok(())
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        self.output_signature().check(value).is_ok() && value.is_finite()
    }

    fn describe(&self) -> Description {
        let n = self.size[self.size.len() - 1];
        Description::new("Rn")
            .field("n", n)
            .tensorial_size(&self.size[..self.size.len() - 1])
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}
