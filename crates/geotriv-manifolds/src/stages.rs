//! Linear maps used as glue stages inside fibrations.
//!
//! None of these constrain anything: they reshape matrices so that the
//! output of one manifold fits the input of the next. Their canonical
//! initialisation zeroes the storage, which leaves the choice of point to the
//! base-point manifolds further down the chain.

use crate::utils::with_dims;
use geotriv_core::{Description, Manifold, Registration, Result, Signature, Value};
use nalgebra::DMatrix;
use rand::RngCore;

fn zero_storage(storage: Option<&mut Value>) -> Result<()> {
    if let Some(value) = storage {
        value.as_tensor_mut()?.fill(0.0);
    }
    Ok(())
}

fn has_shape(value: &Value, shape: &[usize]) -> bool {
    value.as_tensor().is_ok_and(|t| t.shape() == shape)
}

/// `(.., n, k) → (.., k, n)`.
#[derive(Debug)]
pub struct Transpose {
    batch: Vec<usize>,
    n: usize,
    k: usize,
    registration: Registration,
}

impl Transpose {
    /// Transposes matrices of shape `n x k`.
    pub fn new(batch: &[usize], n: usize, k: usize) -> Self {
        Self {
            batch: batch.to_vec(),
            n,
            k,
            registration: Registration::new(),
        }
    }
}

impl Manifold for Transpose {
    fn name(&self) -> &str {
        "Transpose"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.k]))
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.k, self.n]))
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x
            .as_tensor()?
            .try_map_matrices(self.k, self.n, |_, m| Ok(m.transpose()))?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let out = grad
            .as_tensor()?
            .try_map_matrices(self.n, self.k, |_, g| Ok(g.transpose()))?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, _rng: &mut dyn RngCore) -> Result<()> {
        zero_storage(storage)
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        has_shape(value, &with_dims(&self.batch, &[self.k, self.n]))
    }

    fn describe(&self) -> Description {
        Description::new("Transpose")
            .field("n", self.n)
            .field("k", self.k)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// `(.., n, k) → (.., n, n)`, `k <= n`, appending zero columns.
///
/// With `zero_top_block` the top `k x k` block is zeroed as well. Inside
/// SO(n) this removes the directions that only rotate the first `k` columns
/// among themselves, which is what separates the Grassmannian from the
/// Stiefel manifold.
#[derive(Debug)]
pub struct PadColumns {
    batch: Vec<usize>,
    n: usize,
    k: usize,
    zero_top_block: bool,
    registration: Registration,
}

impl PadColumns {
    /// Pads `n x k` matrices to `n x n`.
    pub fn new(batch: &[usize], n: usize, k: usize, zero_top_block: bool) -> Self {
        Self {
            batch: batch.to_vec(),
            n,
            k,
            zero_top_block,
            registration: Registration::new(),
        }
    }

    fn mask(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = m.clone();
        if self.zero_top_block {
            out.view_mut((0, 0), (self.k, self.k)).fill(0.0);
        }
        out
    }
}

impl Manifold for PadColumns {
    fn name(&self) -> &str {
        "PadColumns"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.k]))
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.n]))
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x.as_tensor()?.try_map_matrices(self.n, self.n, |_, m| {
            let mut padded = DMatrix::zeros(self.n, self.n);
            padded.view_mut((0, 0), (self.n, self.k)).copy_from(&self.mask(&m));
            Ok(padded)
        })?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let out = grad.as_tensor()?.try_map_matrices(self.n, self.k, |_, g| {
            Ok(self.mask(&g.columns(0, self.k).into_owned()))
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, _rng: &mut dyn RngCore) -> Result<()> {
        zero_storage(storage)
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        has_shape(value, &with_dims(&self.batch, &[self.n, self.n]))
    }

    fn describe(&self) -> Description {
        Description::new("PadColumns")
            .field("n", self.n)
            .field("k", self.k)
            .field("zero_top_block", self.zero_top_block)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// `(.., n, m) → (.., n, k)`, keeping the first `k <= m` columns.
#[derive(Debug)]
pub struct TakeColumns {
    batch: Vec<usize>,
    n: usize,
    m: usize,
    k: usize,
    registration: Registration,
}

impl TakeColumns {
    /// Keeps the first `k` of `m` columns.
    pub fn new(batch: &[usize], n: usize, m: usize, k: usize) -> Self {
        Self {
            batch: batch.to_vec(),
            n,
            m,
            k,
            registration: Registration::new(),
        }
    }
}

impl Manifold for TakeColumns {
    fn name(&self) -> &str {
        "TakeColumns"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.m]))
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(with_dims(&self.batch, &[self.n, self.k]))
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x
            .as_tensor()?
            .try_map_matrices(self.n, self.k, |_, m| Ok(m.columns(0, self.k).into_owned()))?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let out = grad.as_tensor()?.try_map_matrices(self.n, self.m, |_, g| {
            let mut padded = DMatrix::zeros(self.n, self.m);
            padded.view_mut((0, 0), (self.n, self.k)).copy_from(&g);
            Ok(padded)
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, _rng: &mut dyn RngCore) -> Result<()> {
        zero_storage(storage)
    }

    fn contains(&self, value: &Value, _tol: f64) -> bool {
        has_shape(value, &with_dims(&self.batch, &[self.n, self.k]))
    }

    fn describe(&self) -> Description {
        Description::new("TakeColumns")
            .field("n", self.n)
            .field("k", self.k)
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
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shapes() {
        let t = Transpose::new(&[2], 3, 4);
        assert_eq!(t.output_signature(), Signature::tensor(&[2, 4, 3]));
        let p = PadColumns::new(&[], 5, 2, false);
        assert_eq!(p.output_signature(), Signature::tensor(&[5, 5]));
        let c = TakeColumns::new(&[], 5, 5, 2);
        assert_eq!(c.output_signature(), Signature::tensor(&[5, 2]));
    }

    #[test]
    fn test_pad_then_take_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let x: Value = Tensor::randn(&[4, 2], &mut rng).into();
        let p = PadColumns::new(&[], 4, 2, false);
        let c = TakeColumns::new(&[], 4, 4, 2);
        assert_eq!(c.forward(&p.forward(&x).unwrap()).unwrap(), x);
    }

    #[test]
    fn test_top_block_is_masked() {
        let x: Value = Tensor::full(&[3, 2], 1.0).into();
        let p = PadColumns::new(&[], 3, 2, true);
        let y = p.forward(&x).unwrap().into_tensor().unwrap().matrix(0);
        assert_eq!(y.view((0, 0), (2, 2)).sum(), 0.0);
        assert_eq!(y.row(2).sum(), 2.0);
    }

    #[test]
    fn test_pullbacks() {
        let mut rng = StdRng::seed_from_u64(1);
        let stages: Vec<Box<dyn Manifold>> = vec![
            Box::new(Transpose::new(&[2], 3, 4)),
            Box::new(PadColumns::new(&[2], 4, 3, true)),
            Box::new(TakeColumns::new(&[2], 4, 4, 3)),
        ];
        for stage in &stages {
            assert!(random_pullback_error(stage.as_ref(), &mut rng, 1e-6).unwrap() < 1e-8);
        }
    }
}
