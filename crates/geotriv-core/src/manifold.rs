//! The `Manifold` trait: differentiable trivializations.
//!
//! A trivialization is a smooth surjection `φ: ℝᵈ → ℳ` from an unconstrained
//! ambient space onto a constraint set. An optimizer updates the ambient
//! storage freely, and every read of the parameter returns `φ(storage)`,
//! which lies on `ℳ` by construction.
//!
//! # Mathematical Background
//!
//! Each manifold supplies:
//! - **Forward map**: `φ(x)`, exact up to floating-point rounding
//! - **Pullback**: the vector-Jacobian product `Dφ(x)ᵀ[g]`, which turns a
//!   gradient with respect to the constrained value into a gradient with
//!   respect to the ambient storage
//! - **Canonical initialisation**: a distribution on the ambient space whose
//!   push-forward is the natural distribution on `ℳ` (uniform for compact
//!   manifolds)
//!
//! # Lifecycle
//!
//! A manifold is created unregistered. [`Manifold::register`] binds it to one
//! storage handle, exactly once. Until then only its internal state (base
//! points) can be initialised, and [`Manifold::original_tensor`] fails.

use crate::config::{default_config, TrivializationConfig};
use crate::error::Result;
use crate::registration::Registration;
use crate::tensor::format_shape;
use crate::value::{Signature, Storage, Value};
use rand::RngCore;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Trait for differentiable trivializations.
///
/// Implementors provide the shape declarations, the forward map, its
/// pullback, canonical initialisation and a membership test. The lifecycle
/// (`register`, `evaluate`, `uniform_init`, ...) is provided on top of
/// [`Manifold::registration`].
///
/// The trait is object safe: fibrations and products hold their components
/// as `Box<dyn Manifold>`.
///
/// # Implementation Notes
///
/// - `forward` and `pullback` must be pure and never touch the registered
///   storage.
/// - Leading axes of the ambient tensor beyond the structured ones form the
///   tensorial size; every batch entry is mapped independently.
/// - `canonical_init` receives `None` when the manifold is unregistered or
///   is a later stage of a fibration. It must still resample internal state.
pub trait Manifold: fmt::Debug {
    /// Short name of the manifold, used in errors and logs.
    fn name(&self) -> &str;

    /// Signature of the ambient (unconstrained) input.
    fn ambient_signature(&self) -> Signature;

    /// Signature of the constrained output.
    fn output_signature(&self) -> Signature;

    /// The trivialization map `φ(x)`.
    fn forward(&self, x: &Value) -> Result<Value>;

    /// Vector-Jacobian product `Dφ(x)ᵀ[grad]`.
    ///
    /// `grad` has the output signature, the result the ambient signature.
    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value>;

    /// Resamples internal state and, if given, overwrites `storage` with the
    /// pre-image of a canonically distributed point.
    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore)
        -> Result<()>;

    /// Whether `value` lies on the manifold up to `tol`.
    fn contains(&self, value: &Value, tol: f64) -> bool;

    /// Shape and hyperparameters, for diagnostics.
    fn describe(&self) -> Description;

    /// Registration state.
    fn registration(&self) -> &Registration;

    /// Mutable registration state.
    fn registration_mut(&mut self) -> &mut Registration;

    /// Binds the manifold to its ambient storage.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the storage does not match [`Manifold::ambient_signature`]
    /// - `AlreadyRegistered` if the manifold is already bound
    fn register(&mut self, storage: Storage) -> Result<()> {
        self.ambient_signature().check(&storage.borrow())?;
        let name = self.name().to_string();
        self.registration_mut().bind(&name, storage)
    }

    /// Whether [`Manifold::register`] has succeeded.
    fn is_registered(&self) -> bool {
        self.registration().is_bound()
    }

    /// The storage handle passed to [`Manifold::register`].
    ///
    /// # Errors
    /// Returns `NotRegistered` before registration.
    fn original_tensor(&self) -> Result<Storage> {
        self.registration().storage(self.name())
    }

    /// Applies the forward map to the registered storage.
    fn evaluate(&self) -> Result<Value> {
        self.evaluate_with(default_config())
    }

    /// Like [`Manifold::evaluate`], optionally verifying the constraint.
    ///
    /// A violation is logged, not returned as an error.
    fn evaluate_with(&self, config: &TrivializationConfig) -> Result<Value> {
        let storage = self.original_tensor()?;
        let value = self.forward(&storage.borrow())?;
        if config.check_output && !self.contains(&value, config.tolerance) {
            warn!(
                manifold = self.name(),
                tolerance = config.tolerance,
                "evaluated value is off the manifold"
            );
        }
        Ok(value)
    }

    /// Canonical initialisation of the registered storage, or of the internal
    /// state only when unregistered.
    fn uniform_init(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        debug!(
            manifold = self.name(),
            registered = self.is_registered(),
            "canonical initialisation"
        );
        match self.registration().handle().map(Rc::clone) {
            Some(storage) => {
                let mut value = storage.borrow_mut();
                self.canonical_init(Some(&mut *value), rng)
            }
            None => self.canonical_init(None, rng),
        }
    }

    /// [`Manifold::uniform_init`] with the generator described by `config`.
    fn initialize(&mut self, config: &TrivializationConfig) -> Result<()> {
        let mut rng = config.rng();
        self.uniform_init(&mut rng)
    }
}

/// Human-readable summary of a manifold, e.g. `Sphere(n=5, r=2, tensorial_size=(3))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    name: String,
    fields: Vec<(String, String)>,
}

impl Description {
    /// A description with no fields.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a `key=value` field.
    pub fn field<K: Into<String>, V: fmt::Display>(mut self, key: K, value: V) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Adds the tensorial size, omitted when there is none.
    pub fn tensorial_size(self, batch: &[usize]) -> Self {
        if batch.is_empty() {
            self
        } else {
            self.field("tensorial_size", format_shape(batch))
        }
    }

    /// Manifold name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrivializationError;
    use crate::tensor::Tensor;
    use crate::value::new_storage;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Doubles its input and remembers how often it was initialised.
    #[derive(Debug, Default)]
    struct Doubling {
        inits: usize,
        registration: Registration,
    }

    impl Manifold for Doubling {
        fn name(&self) -> &str {
            "Doubling"
        }

        fn ambient_signature(&self) -> Signature {
            Signature::tensor(&[2])
        }

        fn output_signature(&self) -> Signature {
            Signature::tensor(&[2])
        }

        fn forward(&self, x: &Value) -> Result<Value> {
            Ok(x.scale(2.0))
        }

        fn pullback(&self, _x: &Value, grad: &Value) -> Result<Value> {
            Ok(grad.scale(2.0))
        }

        fn canonical_init(
            &mut self,
            storage: Option<&mut Value>,
            _rng: &mut dyn RngCore,
        ) -> Result<()> {
            self.inits += 1;
            if let Some(value) = storage {
                value.as_tensor_mut()?.fill(1.0);
            }
            Ok(())
        }

        fn contains(&self, value: &Value, _tol: f64) -> bool {
            value.is_finite()
        }

        fn describe(&self) -> Description {
            Description::new("Doubling").field("n", 2)
        }

        fn registration(&self) -> &Registration {
            &self.registration
        }

        fn registration_mut(&mut self) -> &mut Registration {
            &mut self.registration
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut m = Doubling::default();
        assert!(!m.is_registered());
        assert!(m.original_tensor().unwrap_err().is_lifecycle());
        assert!(m.evaluate().is_err());

        let storage = new_storage(Tensor::from_vec(&[2], vec![1.0, 2.0]).unwrap());
        m.register(Rc::clone(&storage)).unwrap();
        assert!(m.is_registered());
        assert!(Rc::ptr_eq(&m.original_tensor().unwrap(), &storage));

        let value = m.evaluate().unwrap();
        assert_eq!(value.to_flat(), vec![2.0, 4.0]);

        let err = m.register(new_storage(Tensor::zeros(&[2]))).unwrap_err();
        assert_eq!(err, TrivializationError::already_registered("Doubling"));
    }

    #[test]
    fn test_register_checks_signature() {
        let mut m = Doubling::default();
        let err = m.register(new_storage(Tensor::zeros(&[3]))).unwrap_err();
        assert!(err.is_configuration());
        assert!(!m.is_registered());
    }

    #[test]
    fn test_uniform_init_writes_registered_storage_only() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut m = Doubling::default();
        m.uniform_init(&mut rng).unwrap();
        assert_eq!(m.inits, 1);

        let storage = new_storage(Tensor::zeros(&[2]));
        m.register(Rc::clone(&storage)).unwrap();
        m.initialize(default_config()).unwrap();
        assert_eq!(m.inits, 2);
        assert_eq!(storage.borrow().to_flat(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_description_display() {
        let d = Description::new("Sphere")
            .field("n", 5)
            .field("r", 2.0)
            .tensorial_size(&[3]);
        assert_eq!(d.to_string(), "Sphere(n=5, r=2, tensorial_size=(3))");
        assert_eq!(d.get("r"), Some("2"));
        assert_eq!(Description::new("SO").tensorial_size(&[]).to_string(), "SO()");
    }
}
