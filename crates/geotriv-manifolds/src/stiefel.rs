//! Stiefel manifold St(n,k) = {X in R^{n×k} : X^T X = I_k}
//!
//! Two trivializations are provided:
//!
//! - [`Stiefel`] embeds the ambient matrix into the Lie algebra of SO(n) and
//!   keeps the first `k` columns of the resulting rotation. It is a
//!   fibration `PadColumns → SO(n) → TakeColumns`, with transpositions around
//!   it for wide matrices.
//! - [`StiefelTall`] projects the ambient matrix onto the tangent space at a
//!   base point `B` and retracts with the Q factor of a QR decomposition:
//!   `qf(B + X - B sym(BᵀX))`.
//!
//! Wide matrices (`n < k`) are handled by working with the transpose, so
//! their rows are orthonormal instead of their columns.

use crate::fibered::Fibration;
use crate::so::{OrthogonalMap, SO};
use crate::stages::{PadColumns, TakeColumns, Transpose};
use crate::utils::{
    haar_stiefel, orthogonality_error, qf, qf_pullback, split_matrix_size, sym, with_dims,
};
use geotriv_core::{
    default_config, Description, Manifold, Registration, Result, Signature, Tensor, Value,
};
use nalgebra::DMatrix;
use rand::RngCore;

/// Whether every matrix of `value` has orthonormal columns (or rows, when wide).
pub(crate) fn has_orthonormal_frames(value: &Value, shape: &[usize], tol: f64) -> bool {
    let Ok(t) = value.as_tensor() else {
        return false;
    };
    t.shape() == shape
        && (0..t.num_matrices()).all(|i| {
            let m = t.matrix(i);
            let err = if m.nrows() >= m.ncols() {
                orthogonality_error(&m)
            } else {
                orthogonality_error(&m.transpose())
            };
            err <= tol
        })
}

/// Builds `[Transpose] → PadColumns → SO → TakeColumns → [Transpose]`.
pub(crate) fn orthogonal_fibration(
    batch: &[usize],
    n: usize,
    k: usize,
    triv: OrthogonalMap,
    zero_top_block: bool,
) -> Result<Fibration> {
    let (tall, short) = (n.max(k), n.min(k));
    let mut stages: Vec<Box<dyn Manifold>> = Vec::with_capacity(5);
    if n < k {
        stages.push(Box::new(Transpose::new(batch, n, k)));
    }
    stages.push(Box::new(PadColumns::new(batch, tall, short, zero_top_block)));
    stages.push(Box::new(SO::with_map(&with_dims(batch, &[tall, tall]), triv)?));
    stages.push(Box::new(TakeColumns::new(batch, tall, tall, short)));
    if n < k {
        stages.push(Box::new(Transpose::new(batch, tall, short)));
    }
    Fibration::new(stages)
}

/// Matrices with orthonormal columns, via SO(n).
///
/// # Canonical initialisation
///
/// The storage is zeroed and the SO(n) base is resampled from the Haar
/// measure, so the value is a Haar-distributed orthonormal frame.
#[derive(Debug)]
pub struct Stiefel {
    shape: Vec<usize>,
    inner: Fibration,
}

impl Stiefel {
    /// St(n, k) for tensors of shape `(.., n, k)`, using the matrix exponential.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_map(size, OrthogonalMap::Expm)
    }

    /// St(n, k) with a named map, `"expm"` or `"cayley"`.
    pub fn with_trivialization(size: &[usize], triv: &str) -> Result<Self> {
        Self::with_map(size, triv.parse()?)
    }

    /// St(n, k) with the given map onto SO.
    pub fn with_map(size: &[usize], triv: OrthogonalMap) -> Result<Self> {
        let (batch, n, k) = split_matrix_size(size)?;
        let description = Description::new("Stiefel")
            .field("n", n)
            .field("k", k)
            .field("triv", triv)
            .tensorial_size(&batch);
        let inner = orthogonal_fibration(&batch, n, k, triv, false)?.named("Stiefel", description);
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

delegate_to_fibration!(Stiefel);

/// A base point on St(max(n,k), min(n,k)) and the QR retraction around it.
///
/// `project` is a self-adjoint linear map applied to the ambient matrix
/// before the retraction, `qf(B + project(B, X))`.
#[derive(Debug)]
pub(crate) struct QrRetraction {
    pub(crate) batch: Vec<usize>,
    pub(crate) n: usize,
    pub(crate) k: usize,
    base: Tensor,
    project: fn(&DMatrix<f64>, &DMatrix<f64>) -> DMatrix<f64>,
}

impl QrRetraction {
    pub(crate) fn new(
        size: &[usize],
        project: fn(&DMatrix<f64>, &DMatrix<f64>) -> DMatrix<f64>,
    ) -> Result<Self> {
        let (batch, n, k) = split_matrix_size(size)?;
        let base = Tensor::zeros(&with_dims(&batch, &[n.max(k), n.min(k)]));
        let mut retraction = Self {
            batch,
            n,
            k,
            base,
            project,
        };
        retraction.resample(&mut default_config().rng())?;
        Ok(retraction)
    }

    pub(crate) fn shape(&self) -> Vec<usize> {
        with_dims(&self.batch, &[self.n, self.k])
    }

    pub(crate) fn base(&self) -> Result<Tensor> {
        self.base
            .try_map_matrices(self.n, self.k, |_, b| Ok(self.orient(b)))
    }

    /// Switches between the caller's orientation and the tall one. Its own inverse.
    fn orient(&self, m: DMatrix<f64>) -> DMatrix<f64> {
        if self.n < self.k {
            m.transpose()
        } else {
            m
        }
    }

    fn lifted(&self, i: usize, x: DMatrix<f64>) -> DMatrix<f64> {
        let b = self.base.matrix(i);
        let step = (self.project)(&b, &self.orient(x));
        b + step
    }

    pub(crate) fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.try_map_matrices(self.n, self.k, |i, m| {
            Ok(self.orient(qf(&self.lifted(i, m))))
        })
    }

    pub(crate) fn pullback(&self, x: &Tensor, grad: &Tensor) -> Result<Tensor> {
        grad.try_map_matrices(self.n, self.k, |i, g| {
            let y = self.lifted(i, x.matrix(i));
            let grad_y = qf_pullback(&y, &self.orient(g))?;
            Ok(self.orient((self.project)(&self.base.matrix(i), &grad_y)))
        })
    }

    pub(crate) fn resample(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        let (tall, short) = (self.n.max(self.k), self.n.min(self.k));
        let bases: Vec<DMatrix<f64>> = (0..self.base.num_matrices())
            .map(|_| haar_stiefel(tall, short, rng))
            .collect();
        self.base = Tensor::from_matrices(&self.batch, tall, short, &bases)?;
        Ok(())
    }
}

/// Projection onto the tangent space of the Stiefel manifold at `b`.
fn stiefel_tangent(b: &DMatrix<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    x - b * sym(&(b.transpose() * x))
}

/// Matrices with orthonormal columns, via the QR retraction at a base point.
///
/// # Canonical initialisation
///
/// The base is resampled from the Haar measure and the storage is zeroed.
#[derive(Debug)]
pub struct StiefelTall {
    retraction: QrRetraction,
    registration: Registration,
}

impl StiefelTall {
    /// St(n, k) for tensors of shape `(.., n, k)`.
    pub fn new(size: &[usize]) -> Result<Self> {
        Ok(Self {
            retraction: QrRetraction::new(size, stiefel_tangent)?,
            registration: Registration::new(),
        })
    }

    /// The base point(s), in the orientation of the output.
    pub fn base(&self) -> Result<Tensor> {
        self.retraction.base()
    }
}

impl Manifold for StiefelTall {
    fn name(&self) -> &str {
        "StiefelTall"
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
        Description::new("StiefelTall")
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
