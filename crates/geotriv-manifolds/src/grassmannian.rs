//! Grassmannian Gr(n,k) of `k`-dimensional subspaces of R^n, represented by
//! orthonormal frames.
//!
//! A point is any frame spanning the subspace, so membership is the same as
//! for the Stiefel manifold. The trivializations differ in which ambient
//! directions they keep: only those that move the subspace.

use crate::fibered::Fibration;
use crate::so::OrthogonalMap;
use crate::stiefel::{has_orthonormal_frames, orthogonal_fibration, QrRetraction};
use crate::utils::split_matrix_size;
use geotriv_core::{Description, Manifold, Registration, Result, Signature, Tensor, Value};
use nalgebra::DMatrix;
use rand::RngCore;

/// Subspaces via SO(n), with the rotations of the frame within itself masked out.
#[derive(Debug)]
pub struct Grassmannian {
    shape: Vec<usize>,
    inner: Fibration,
}

impl Grassmannian {
    /// Gr(n, k) for tensors of shape `(.., n, k)`, using the matrix exponential.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_map(size, OrthogonalMap::Expm)
    }

    /// Gr(n, k) with a named map, `"expm"` or `"cayley"`.
    pub fn with_trivialization(size: &[usize], triv: &str) -> Result<Self> {
        Self::with_map(size, triv.parse()?)
    }

    /// Gr(n, k) with the given map onto SO.
    pub fn with_map(size: &[usize], triv: OrthogonalMap) -> Result<Self> {
        let (batch, n, k) = split_matrix_size(size)?;
        let description = Description::new("Grassmannian")
            .field("n", n)
            .field("k", k)
            .field("triv", triv)
            .tensorial_size(&batch);
        let inner =
            orthogonal_fibration(&batch, n, k, triv, true)?.named("Grassmannian", description);
        Ok(Self {
            shape: size.to_vec(),
            inner,
        })
    }

    /// The underlying fibration.
    pub fn fibration(&self) -> &Fibration {
        &self.inner
    }

    fn is_member(&self, value: &Value, tol: f64) -> bool {
        has_orthonormal_frames(value, &self.shape, tol)
    }
}

delegate_to_fibration!(Grassmannian);

/// Projection onto the horizontal space at `b`, the directions orthogonal to its span.
fn horizontal(b: &DMatrix<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    x - b * (b.transpose() * x)
}

/// Subspaces via the QR retraction `qf(B + (I - BBᵀ)X)` at a base frame `B`.
#[derive(Debug)]
pub struct GrassmannianTall {
    retraction: QrRetraction,
    registration: Registration,
}

impl GrassmannianTall {
    /// Gr(n, k) for tensors of shape `(.., n, k)`.
    pub fn new(size: &[usize]) -> Result<Self> {
        Ok(Self {
            retraction: QrRetraction::new(size, horizontal)?,
            registration: Registration::new(),
        })
    }

    /// The base frame(s), in the orientation of the output.
    pub fn base(&self) -> Result<Tensor> {
        self.retraction.base()
    }
}

impl Manifold for GrassmannianTall {
    fn name(&self) -> &str {
        "GrassmannianTall"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(self.retraction.shape())
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(self.retraction.shape())
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        Ok(self.retraction.forward(x.as_tensor()?)?.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        Ok(self.retraction.pullback(x.as_tensor()?, grad.as_tensor()?)?.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        self.retraction.resample(rng)?;
        if let Some(value) = storage {
            value.as_tensor_mut()?.fill(0.0);
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        has_orthonormal_frames(value, &self.retraction.shape(), tol)
    }

    fn describe(&self) -> Description {
        Description::new("GrassmannianTall")
            .field("n", self.retraction.n)
            .field("k", self.retraction.k)
            .tensorial_size(&self.retraction.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}
