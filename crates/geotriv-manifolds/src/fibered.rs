//! Sequential composition of manifolds.
//!
//! A fibration `[A, B, C]` evaluates `C(B(A(x)))`. Each stage's output
//! signature must equal the next stage's ambient signature, which is checked
//! once at construction. Only the composite can be registered; the stages
//! never see the storage except for stage 0 during canonical initialisation.

use geotriv_core::{
    Description, Manifold, Registration, Result, Signature, TrivializationError, Value,
};
use rand::RngCore;
use tracing::debug;

/// An ordered chain of manifolds composed left to right.
#[derive(Debug)]
pub struct Fibration {
    name: String,
    description: Option<Description>,
    stages: Vec<Box<dyn Manifold>>,
    registration: Registration,
}

impl Fibration {
    /// Builds the chain, checking adjacent signatures.
    ///
    /// # Errors
    /// - `InvalidParameter` for an empty chain
    /// - `IncompatibleStages` when stage `i` does not accept the output of
    ///   stage `i - 1`
    /// - `AlreadyRegistered` when a stage is bound to a storage of its own
    pub fn new(stages: Vec<Box<dyn Manifold>>) -> Result<Self> {
        if stages.is_empty() {
            return Err(TrivializationError::invalid_parameter(
                "stages",
                "a fibration needs at least one stage",
            ));
        }
        if let Some(stage) = stages.iter().find(|stage| stage.is_registered()) {
            return Err(TrivializationError::already_registered(stage.name()));
        }
        for (i, pair) in stages.windows(2).enumerate() {
            let produced = pair[0].output_signature();
            let expected = pair[1].ambient_signature();
            if produced != expected {
                return Err(TrivializationError::incompatible_stages(
                    i + 1,
                    expected,
                    produced,
                ));
            }
        }
        debug!(
            stages = stages.len(),
            ambient = %stages[0].ambient_signature(),
            "built fibration"
        );
        Ok(Self {
            name: "Fibration".to_string(),
            description: None,
            stages,
            registration: Registration::new(),
        })
    }

    /// Renames the composite, for manifolds defined as fibrations.
    pub fn named<S: Into<String>>(mut self, name: S, description: Description) -> Self {
        self.name = name.into();
        self.description = Some(description);
        self
    }

    /// The stages, in evaluation order.
    pub fn stages(&self) -> &[Box<dyn Manifold>] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false: construction rejects empty chains.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The input of every stage followed by the final output.
    pub fn trace(&self, x: &Value) -> Result<Vec<Value>> {
        let mut points = Vec::with_capacity(self.stages.len() + 1);
        points.push(x.clone());
        for stage in &self.stages {
            let next = stage.forward(&points[points.len() - 1])?;
            points.push(next);
        }
        Ok(points)
    }

    fn first(&self) -> &dyn Manifold {
        self.stages[0].as_ref()
    }

    fn last(&self) -> &dyn Manifold {
        self.stages[self.stages.len() - 1].as_ref()
    }
}

impl Manifold for Fibration {
    fn name(&self) -> &str {
        &self.name
    }

    fn ambient_signature(&self) -> Signature {
        self.first().ambient_signature()
    }

    fn output_signature(&self) -> Signature {
        self.last().output_signature()
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        let mut value = self.first().forward(x)?;
        for stage in &self.stages[1..] {
            value = stage.forward(&value)?;
        }
        Ok(value)
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        let points = self.trace(x)?;
        let mut grad = grad.clone();
        for (stage, point) in self.stages.iter().zip(&points[..self.stages.len()]).rev() {
            grad = stage.pullback(point, &grad)?;
        }
        Ok(grad)
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        let mut storage = storage;
        for stage in &mut self.stages {
            stage.canonical_init(storage.take(), rng)?;
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        self.last().contains(value, tol)
    }

    fn describe(&self) -> Description {
        if let Some(description) = &self.description {
            return description.clone();
        }
        let names: Vec<String> = self.stages.iter().map(|s| s.describe().to_string()).collect();
        Description::new(self.name.clone()).field("stages", format!("[{}]", names.join(", ")))
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
    use crate::reals::Rn;
    use crate::sphere::{Sphere, SphereEmbedded};
    use crate::stages::{PadColumns, TakeColumns, Transpose};
    use geotriv_core::test_utils::random_pullback_error;
    use geotriv_core::Tensor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_chain_is_rejected() {
        assert!(Fibration::new(Vec::new()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_incompatible_stages() {
        let err = Fibration::new(vec![
            Box::new(Rn::new(&[3]).unwrap()),
            Box::new(Rn::new(&[4]).unwrap()),
        ])
        .unwrap_err();
        assert_eq!(err, TrivializationError::incompatible_stages(1, "(4)", "(3)"));
    }

    #[test]
    fn test_registered_stage_is_rejected() {
        let mut head = Rn::new(&[3]).unwrap();
        head.register(geotriv_core::new_storage(Tensor::zeros(&[3]))).unwrap();
        let err = Fibration::new(vec![Box::new(head)]).unwrap_err();
        assert_eq!(err, TrivializationError::already_registered("Rn"));

        let mut tail = SphereEmbedded::new(&[3], 1.0).unwrap();
        tail.register(geotriv_core::new_storage(Tensor::zeros(&[3]))).unwrap();
        let err = Fibration::new(vec![Box::new(Rn::new(&[3]).unwrap()), Box::new(tail)])
            .unwrap_err();
        assert!(err.is_lifecycle());
    }

    #[test]
    fn test_composition_law() {
        let mut rng = StdRng::seed_from_u64(0);
        let first = Transpose::new(&[], 2, 3);
        let second = PadColumns::new(&[], 3, 2, false);
        let x: Value = Tensor::randn(&[2, 3], &mut rng).into();
        let expected = second.forward(&first.forward(&x).unwrap()).unwrap();

        let f = Fibration::new(vec![Box::new(first), Box::new(second)]).unwrap();
        assert_eq!(f.forward(&x).unwrap(), expected);
        assert_eq!(f.len(), 2);
        assert_eq!(f.trace(&x).unwrap().len(), 3);
    }

    #[test]
    fn test_pullback_chains() {
        let mut rng = StdRng::seed_from_u64(1);
        let f = Fibration::new(vec![
            Box::new(SphereEmbedded::new(&[2, 4], 1.0).unwrap()),
            Box::new(Sphere::new(&[2, 4], 2.0).unwrap()),
        ])
        .unwrap();
        assert!(random_pullback_error(&f, &mut rng, 1e-6).unwrap() < 1e-7);
    }

    #[test]
    fn test_only_first_stage_sees_storage() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut f = Fibration::new(vec![
            Box::new(TakeColumns::new(&[], 3, 3, 3)),
            Box::new(Rn::new(&[3, 3]).unwrap()),
        ])
        .unwrap();
        let mut storage: Value = Tensor::full(&[3, 3], 1.0).into();
        f.canonical_init(Some(&mut storage), &mut rng).unwrap();
        // Rn would have filled it with samples; TakeColumns zeroes it.
        assert_eq!(storage.norm(), 0.0);
    }

    #[test]
    fn test_describe() {
        let f = Fibration::new(vec![Box::new(Rn::new(&[3]).unwrap())]).unwrap();
        assert_eq!(f.describe().to_string(), "Fibration(stages=[Rn(n=3)])");
        let named = f.named("Euclidean", Description::new("Euclidean").field("n", 3));
        assert_eq!(named.name(), "Euclidean");
        assert_eq!(named.describe().to_string(), "Euclidean(n=3)");
    }
}
