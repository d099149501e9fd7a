//! The special orthogonal group SO(n).
//!
//! # Trivialization
//!
//! A base point `B ∈ SO(n)` is kept as internal state. The ambient matrix `X`
//! is turned into a skew-symmetric matrix `A` (its strict lower triangle minus
//! its transpose) and mapped to `B φ(A)`, where `φ` is either the matrix
//! exponential or the Cayley map. Both send skew-symmetric matrices to
//! SO(n), so the output is special orthogonal for every input.
//!
//! # Canonical initialisation
//!
//! `B` is resampled from the Haar measure on SO(n) and the storage is zeroed,
//! so the first evaluated value is exactly `B`.

use crate::utils::{
    cayley, cayley_pullback, expm, expm_pullback, haar_special_orthogonal,
    orthogonality_error, skew_from_triangle, skew_from_triangle_pullback, split_square_size,
    with_dims,
};
use geotriv_core::{
    default_config, Description, Manifold, Registration, Result, Signature, Tensor,
    TrivializationError, Value,
};
use nalgebra::DMatrix;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// Map from skew-symmetric matrices onto SO(n).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrthogonalMap {
    /// Matrix exponential
    #[default]
    Expm,
    /// Cayley transform `(I - A/2)⁻¹ (I + A/2)`
    Cayley,
}

impl OrthogonalMap {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 2] = ["expm", "cayley"];

    /// Applies the map.
    pub fn apply(self, a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match self {
            Self::Expm => Ok(expm(a)),
            Self::Cayley => cayley(a),
        }
    }

    /// Pullback of [`OrthogonalMap::apply`].
    pub fn pullback(self, a: &DMatrix<f64>, grad: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match self {
            Self::Expm => Ok(expm_pullback(a, grad)),
            Self::Cayley => cayley_pullback(a, grad),
        }
    }
}

impl FromStr for OrthogonalMap {
    type Err = TrivializationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "expm" => Ok(Self::Expm),
            "cayley" => Ok(Self::Cayley),
            other => Err(TrivializationError::unknown_trivialization(other, &Self::NAMES)),
        }
    }
}

impl fmt::Display for OrthogonalMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Expm => "expm",
            Self::Cayley => "cayley",
        })
    }
}

/// Special orthogonal matrices `XᵀX = I`, `det X = 1`.
#[derive(Debug)]
pub struct SO {
    batch: Vec<usize>,
    n: usize,
    triv: OrthogonalMap,
    base: Tensor,
    registration: Registration,
}

impl SO {
    /// SO(n) with shape `(.., n, n)` and the exponential map.
    pub fn new(size: &[usize]) -> Result<Self> {
        Self::with_map(size, OrthogonalMap::Expm)
    }

    /// SO(n) with a named map, `"expm"` or `"cayley"`.
    pub fn with_trivialization(size: &[usize], triv: &str) -> Result<Self> {
        Self::with_map(size, triv.parse()?)
    }

    /// SO(n) with the given map.
    ///
    /// The base is sampled at construction from an entropy-seeded generator;
    /// call [`Manifold::uniform_init`] to resample it reproducibly.
    pub fn with_map(size: &[usize], triv: OrthogonalMap) -> Result<Self> {
        let (batch, n) = split_square_size(size)?;
        let base = Tensor::zeros(size);
        let mut so = Self {
            batch,
            n,
            triv,
            base,
            registration: Registration::new(),
        };
        so.canonical_init(None, &mut default_config().rng())?;
        Ok(so)
    }

    /// The current base point(s).
    pub fn base(&self) -> &Tensor {
        &self.base
    }

    /// The map from skew-symmetric matrices to SO(n).
    pub fn trivialization(&self) -> OrthogonalMap {
        self.triv
    }

    fn shape(&self) -> Vec<usize> {
        with_dims(&self.batch, &[self.n, self.n])
    }
}

impl Manifold for SO {
    fn name(&self) -> &str {
        "SO"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn output_signature(&self) -> Signature {
        Signature::Tensor(self.shape())
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x.as_tensor()?.try_map_matrices(self.n, self.n, |i, m| {
            let a = skew_from_triangle(&m, true);
            Ok(self.base.matrix(i) * self.triv.apply(&a)?)
        })?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let x = x.as_tensor()?;
        let out = grad.as_tensor()?.try_map_matrices(self.n, self.n, |i, g| {
            let a = skew_from_triangle(&x.matrix(i), true);
            let grad_phi = self.base.matrix(i).transpose() * g;
            let grad_a = self.triv.pullback(&a, &grad_phi)?;
            Ok(skew_from_triangle_pullback(&grad_a, true))
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        let bases: Vec<DMatrix<f64>> = (0..self.base.num_matrices())
            .map(|_| haar_special_orthogonal(self.n, rng))
            .collect();
        self.base = Tensor::from_matrices(&self.batch, self.n, self.n, &bases)?;
        if let Some(value) = storage {
            value.as_tensor_mut()?.fill(0.0);
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
                orthogonality_error(&m) <= tol && m.determinant() > 0.0
            })
    }

    fn describe(&self) -> Description {
        Description::new("SO")
            .field("n", self.n)
            .field("triv", self.triv)
            .tensorial_size(&self.batch)
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}
