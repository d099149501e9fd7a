//! Sphere manifold S^{n-1}(r) = {x in R^n : ||x|| = r}
//!
//! Two trivializations are provided:
//! - [`SphereEmbedded`] projects the ambient vector radially, `r x / ||x||`.
//! - [`Sphere`] uses the exponential map at a base point `b`: the ambient
//!   vector is projected onto the tangent space at `b` and moved along the
//!   great circle it spans.
//!
//! Both act on the last axis; leading axes are an independent batch.

use crate::utils::split_vector_size;
use geotriv_core::stability::{sinc, sinc_grad};
use geotriv_core::{
    default_config, Description, Manifold, Registration, Result, Signature, Tensor,
    TrivializationError, Value,
};
use nalgebra::DVector;
use rand::RngCore;

/// Radial projection `x / ||x||` onto the unit sphere.
///
/// Undefined at `x = 0`, where it yields NaN.
pub fn project(x: &DVector<f64>) -> DVector<f64> {
    x / x.norm()
}

/// Removes the component of `v` along the unit vector `x`.
pub fn tangent_frame(x: &DVector<f64>, v: &DVector<f64>) -> DVector<f64> {
    v - x * x.dot(v)
}

/// Exponential map on the sphere of radius `r` at the unit vector `x`.
///
/// `v` is first projected onto the tangent space at `x`. With `v'` the
/// projection and `ρ = ||v'||` the result is `r (cos ρ x + sinc ρ v')`.
pub fn exponential(x: &DVector<f64>, v: &DVector<f64>, r: f64) -> DVector<f64> {
    let v = tangent_frame(x, v);
    let rho = v.norm();
    (x * rho.cos() + v * sinc(rho)) * r
}

/// Pullback of [`exponential`] with respect to `v`.
pub fn exponential_pullback(
    x: &DVector<f64>,
    v: &DVector<f64>,
    grad: &DVector<f64>,
    r: f64,
) -> DVector<f64> {
    let v = tangent_frame(x, v);
    let rho = v.norm();
    let a = grad.dot(x);
    let b = grad.dot(&v);
    // d sinc(ρ)/dρ · dρ/dv' = sinc'(ρ) v'/ρ, which vanishes with v'
    let c = if rho > 0.0 { sinc_grad(rho) / rho } else { 0.0 };
    let grad_frame = (&v * (c * b - sinc(rho) * a) + grad * sinc(rho)) * r;
    tangent_frame(x, &grad_frame)
}

fn check_radius(r: f64) -> Result<()> {
    if r.is_finite() && r > 0.0 {
        Ok(())
    } else {
        Err(TrivializationError::invalid_parameter(
            "r",
            format!("the radius has to be a positive real number, got {r}"),
        ))
    }
}

fn on_sphere(value: &Value, shape: &[usize], r: f64, tol: f64) -> bool {
    let Ok(t) = value.as_tensor() else {
        return false;
    };
    t.shape() == shape && (0..t.num_vectors()).all(|i| (t.vector(i).norm() - r).abs() <= tol)
}

/// Sphere of radius `r` via radial projection of the ambient vector.
///
/// # Canonical initialisation
///
/// When registered, the storage is filled with standard normal samples and
/// projected onto the unit sphere, so the value is uniform on the sphere.
/// Unregistered, there is nothing to initialise.
#[derive(Debug)]
pub struct SphereEmbedded {
    size: Vec<usize>,
    n: usize,
    r: f64,
    registration: Registration,
}

impl SphereEmbedded {
    /// Names accepted by [`SphereEmbedded::with_trivialization`].
    pub const TRIVIALIZATIONS: [&'static str; 1] = ["project"];

    /// Sphere of radius `r` for tensors of shape `(.., n)`.
    pub fn new(size: &[usize], r: f64) -> Result<Self> {
        Self::with_trivialization(size, "project", r)
    }

    /// Sphere with a named trivialization. Only `"project"` exists.
    pub fn with_trivialization(size: &[usize], triv: &str, r: f64) -> Result<Self> {
        if !Self::TRIVIALIZATIONS.contains(&triv) {
            return Err(TrivializationError::unknown_trivialization(
                triv,
                &Self::TRIVIALIZATIONS,
            ));
        }
        check_radius(r)?;
        let (_, n) = split_vector_size(size)?;
        Ok(Self {
            size: size.to_vec(),
            n,
            r,
            registration: Registration::new(),
        })
    }

    /// The radius.
    pub fn radius(&self) -> f64 {
        self.r
    }
}

impl Manifold for SphereEmbedded {
    fn name(&self) -> &str {
        "SphereEmbedded"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn output_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let out = x
            .as_tensor()?
            .try_map_vectors(self.n, |_, v| Ok(project(&v) * self.r))?;
        Ok(out.into())
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let x = x.as_tensor()?;
        let out = grad.as_tensor()?.try_map_vectors(self.n, |i, g| {
            let v = x.vector(i);
            let norm = v.norm();
            let u = &v / norm;
            Ok(tangent_frame(&u, &g) * (self.r / norm))
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        if let Some(value) = storage {
            let t = value.as_tensor_mut()?;
            t.fill_randn(rng);
            *t = t.try_map_vectors(self.n, |_, v| Ok(project(&v)))?;
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        on_sphere(value, &self.size, self.r, tol)
    }

    fn describe(&self) -> Description {
        Description::new("SphereEmbedded")
            .field("n", self.n)
            .field("r", self.r)
            .tensorial_size(&self.size[..self.size.len() - 1])
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}

/// Sphere of radius `r` via the exponential map at a base point.
///
/// # Canonical initialisation
///
/// The base is resampled uniformly on the sphere and the storage, if any, is
/// zeroed, so the value right after initialisation is exactly the base.
#[derive(Debug)]
pub struct Sphere {
    size: Vec<usize>,
    n: usize,
    r: f64,
    /// Base point divided by `r`.
    unit_base: Tensor,
    registration: Registration,
}

impl Sphere {
    /// Sphere of radius `r` for tensors of shape `(.., n)`.
    ///
    /// The base is sampled at construction from an entropy-seeded generator;
    /// call [`Manifold::uniform_init`] to resample it reproducibly.
    pub fn new(size: &[usize], r: f64) -> Result<Self> {
        check_radius(r)?;
        let (_, n) = split_vector_size(size)?;
        let mut sphere = Self {
            size: size.to_vec(),
            n,
            r,
            unit_base: Tensor::zeros(size),
            registration: Registration::new(),
        };
        sphere.canonical_init(None, &mut default_config().rng())?;
        Ok(sphere)
    }

    /// The radius.
    pub fn radius(&self) -> f64 {
        self.r
    }

    /// The base point(s), of norm `r`.
    pub fn base(&self) -> Tensor {
        self.unit_base.scale(self.r)
    }
}

impl Manifold for Sphere {
    fn name(&self) -> &str {
        "Sphere"
    }

    fn ambient_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn output_signature(&self) -> Signature {
        Signature::tensor(&self.size)
    }

    fn forward(&self, v: &Value) -> Result<Value> {
        self.ambient_signature().check(v)?;
        let out = v.as_tensor()?.try_map_vectors(self.n, |i, v| {
            Ok(exponential(&self.unit_base.vector(i), &v, self.r))
        })?;
        Ok(out.into())
    }

    fn pullback(&self, v: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(v)?;
        self.output_signature().check(grad)?;
        let v = v.as_tensor()?;
        let out = grad.as_tensor()?.try_map_vectors(self.n, |i, g| {
            Ok(exponential_pullback(
                &self.unit_base.vector(i),
                &v.vector(i),
                &g,
                self.r,
            ))
        })?;
        Ok(out.into())
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        let sample = Tensor::randn(&self.size, rng);
        self.unit_base = sample.try_map_vectors(self.n, |_, v| Ok(project(&v)))?;
        if let Some(value) = storage {
            value.as_tensor_mut()?.fill(0.0);
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        on_sphere(value, &self.size, self.r, tol)
    }

    fn describe(&self) -> Description {
        Description::new("Sphere")
            .field("n", self.n)
            .field("r", self.r)
            .tensorial_size(&self.size[..self.size.len() - 1])
    }

    fn registration(&self) -> &Registration {
        &self.registration
    }

    fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }
}
