//! Product manifold M₁ × M₂ × ... × Mₖ with named components.
//!
//! The ambient value of a product is a set of named tensors, one per
//! component. Components are independent: the forward map, the pullback and
//! the initialisation of one entry never read or write another.

use geotriv_core::{
    Description, Manifold, NamedTensors, OrderedMap, Registration, Result, Signature, Tensor,
    TrivializationError, Value,
};
use rand::RngCore;
use std::mem;

/// Named, independent manifolds evaluated side by side.
#[derive(Debug)]
pub struct ProductManifold {
    components: OrderedMap<Box<dyn Manifold>>,
    registration: Registration,
}

impl ProductManifold {
    /// Creates a product from `(name, manifold)` pairs, keeping their order.
    ///
    /// # Errors
    /// - `InvalidParameter` for an empty product, an empty or repeated name,
    ///   or a component whose signatures are not single tensors
    /// - `AlreadyRegistered` when a component is bound to a storage of its own
    pub fn new<S, I>(components: I) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Box<dyn Manifold>)>,
    {
        let mut map = OrderedMap::new();
        for (name, manifold) in components {
            let name = name.into();
            if name.is_empty() {
                return Err(TrivializationError::invalid_parameter(
                    "name",
                    "component names must be non-empty",
                ));
            }
            if map.contains_key(&name) {
                return Err(TrivializationError::invalid_parameter(
                    "name",
                    format!("duplicate component `{name}`"),
                ));
            }
            if manifold.ambient_signature().as_shape().is_none()
                || manifold.output_signature().as_shape().is_none()
            {
                return Err(TrivializationError::invalid_parameter(
                    name,
                    "product components must map single tensors",
                ));
            }
            if manifold.is_registered() {
                return Err(TrivializationError::already_registered(manifold.name()));
            }
            map.insert(name, manifold);
        }
        if map.is_empty() {
            return Err(TrivializationError::invalid_parameter(
                "components",
                "a product needs at least one component",
            ));
        }
        Ok(Self {
            components: map,
            registration: Registration::new(),
        })
    }

    /// Borrows a component.
    pub fn get(&self, name: &str) -> Option<&dyn Manifold> {
        self.components.get(name).map(|m| m.as_ref())
    }

    /// Mutably borrows a component.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Manifold + 'static)> {
        self.components.get_mut(name).map(|m| m.as_mut())
    }

    /// Component names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false: construction rejects empty products.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Initialises one component. When `storage` is given, only the entry
    /// named `name` is written.
    ///
    /// # Errors
    /// `InvalidParameter` if no component is called `name`.
    pub fn init_component(
        &mut self,
        name: &str,
        storage: Option<&mut Value>,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let component = self.components.get_mut(name).ok_or_else(|| {
            TrivializationError::invalid_parameter("name", format!("no component `{name}`"))
        })?;
        match storage {
            Some(value) => {
                let slot = value.as_named_mut()?.get_mut(name).ok_or_else(|| {
                    TrivializationError::shape_mismatch(format!("component `{name}`"), "none")
                })?;
                init_slot(component.as_mut(), slot, rng)
            }
            None => component.canonical_init(None, rng),
        }
    }

    fn shapes<F>(&self, signature: F) -> Signature
    where
        F: Fn(&dyn Manifold) -> Signature,
    {
        Signature::Named(self.components.map_values(|_, m| {
            signature(m.as_ref()).as_shape().map(<[usize]>::to_vec).unwrap_or_default()
        }))
    }
}

/// Runs a component's initialiser on one entry of a named storage.
fn init_slot(component: &mut dyn Manifold, slot: &mut Tensor, rng: &mut dyn RngCore) -> Result<()> {
    let mut value = Value::Tensor(mem::replace(slot, Tensor::zeros(&[])));
    let result = component.canonical_init(Some(&mut value), rng);
    *slot = value.into_tensor()?;
    result
}

impl Manifold for ProductManifold {
    fn name(&self) -> &str {
        "Product"
    }

    fn ambient_signature(&self) -> Signature {
        self.shapes(|m| m.ambient_signature())
    }

    fn output_signature(&self) -> Signature {
        self.shapes(|m| m.output_signature())
    }

    fn forward(&self, x: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        let x = x.as_named()?;
        let out: NamedTensors = self.components.try_map_values(|name, m| {
            let entry = x.get(name).cloned().unwrap_or_else(|| Tensor::zeros(&[]));
            m.forward(&Value::Tensor(entry))?.into_tensor()
        })?;
        Ok(Value::Named(out))
    }

    fn pullback(&self, x: &Value, grad: &Value) -> Result<Value> {
        self.ambient_signature().check(x)?;
        self.output_signature().check(grad)?;
        let x = x.as_named()?;
        let grad = grad.as_named()?;
        let out: NamedTensors = self.components.try_map_values(|name, m| {
            let point = x.get(name).cloned().unwrap_or_else(|| Tensor::zeros(&[]));
            let g = grad.get(name).cloned().unwrap_or_else(|| Tensor::zeros(&[]));
            m.pullback(&Value::Tensor(point), &Value::Tensor(g))?
                .into_tensor()
        })?;
        Ok(Value::Named(out))
    }

    fn canonical_init(&mut self, storage: Option<&mut Value>, rng: &mut dyn RngCore) -> Result<()> {
        match storage {
            Some(value) => {
                let named = value.as_named_mut()?;
                for (name, component) in self.components.iter_mut() {
                    let slot = named.get_mut(name).ok_or_else(|| {
                        TrivializationError::shape_mismatch(format!("component `{name}`"), "none")
                    })?;
                    init_slot(component.as_mut(), slot, rng)?;
                }
            }
            None => {
                for (_, component) in self.components.iter_mut() {
                    component.canonical_init(None, rng)?;
                }
            }
        }
        Ok(())
    }

    fn contains(&self, value: &Value, tol: f64) -> bool {
        let Ok(named) = value.as_named() else {
            return false;
        };
        named.len() == self.components.len()
            && self.components.iter().all(|(name, m)| {
                named
                    .get(name)
                    .is_some_and(|t| m.contains(&Value::Tensor(t.clone()), tol))
            })
    }

    fn describe(&self) -> Description {
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|(name, m)| format!("{name}: {}", m.describe()))
            .collect();
        Description::new("Product").field("components", format!("{{{}}}", parts.join(", ")))
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
    use crate::so::SO;
    use crate::sphere::{Sphere, SphereEmbedded};
    use geotriv_core::new_storage;
    use geotriv_core::test_utils::{random_pullback_error, random_value};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    fn product() -> ProductManifold {
        let components: Vec<(&str, Box<dyn Manifold>)> = vec![
            ("sphere", Box::new(SphereEmbedded::new(&[4], 1.0).unwrap())),
            ("rotation", Box::new(SO::new(&[3, 3]).unwrap())),
            ("free", Box::new(Rn::new(&[2]).unwrap())),
        ];
        ProductManifold::new(components).unwrap()
    }

    #[test]
    fn test_names_keep_order() {
        let p = product();
        assert_eq!(p.names().collect::<Vec<_>>(), vec!["sphere", "rotation", "free"]);
        assert_eq!(
            p.ambient_signature().to_string(),
            "{sphere: (4), rotation: (3, 3), free: (2)}"
        );
        assert!(p.get("sphere").is_some());
        assert!(p.get("missing").is_none());
    }

    #[test]
    fn test_invalid_components() {
        let duplicate: Vec<(&str, Box<dyn Manifold>)> = vec![
            ("a", Box::new(Rn::new(&[2]).unwrap())),
            ("a", Box::new(Rn::new(&[3]).unwrap())),
        ];
        assert!(ProductManifold::new(duplicate).is_err());

        let unnamed: Vec<(&str, Box<dyn Manifold>)> = vec![("", Box::new(Rn::new(&[2]).unwrap()))];
        assert!(ProductManifold::new(unnamed).is_err());

        let nested: Vec<(&str, Box<dyn Manifold>)> = vec![("inner", Box::new(product()))];
        assert!(ProductManifold::new(nested).is_err());

        let empty: Vec<(&str, Box<dyn Manifold>)> = Vec::new();
        assert!(ProductManifold::new(empty).is_err());
    }

    #[test]
    fn test_forward_is_componentwise() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = product();
        let x = random_value(&p.ambient_signature(), &mut rng);
        let y = p.forward(&x).unwrap();
        assert!(p.contains(&y, 1e-10));

        let sphere = p.get("sphere").unwrap();
        let expected = sphere
            .forward(&Value::Tensor(x.component("sphere").unwrap().clone()))
            .unwrap();
        assert_eq!(&Value::Tensor(y.component("sphere").unwrap().clone()), &expected);
    }

    #[test]
    fn test_pullback() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = product();
        p.uniform_init(&mut rng).unwrap();
        assert!(random_pullback_error(&p, &mut rng, 1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_init_component_leaves_others_untouched() {
        let mut rng = StdRng::seed_from_u64(2);
        let components: Vec<(&str, Box<dyn Manifold>)> = vec![
            ("a", Box::new(Sphere::new(&[3], 1.0).unwrap())),
            ("b", Box::new(SphereEmbedded::new(&[3], 1.0).unwrap())),
        ];
        let mut p = ProductManifold::new(components).unwrap();
        let storage = new_storage(random_value(&p.ambient_signature(), &mut rng));
        p.register(Rc::clone(&storage)).unwrap();
        let zero: Value = Tensor::zeros(&[3]).into();
        let base_of_a = |p: &ProductManifold| p.get("a").unwrap().forward(&zero).unwrap();
        let stored = storage.borrow().component("a").unwrap().clone();
        let visible = p.evaluate().unwrap().component("a").unwrap().clone();
        let base = base_of_a(&p);

        {
            let mut value = storage.borrow_mut();
            p.init_component("b", Some(&mut *value), &mut rng).unwrap();
        }
        assert_eq!(storage.borrow().component("a").unwrap(), &stored);
        assert_eq!(p.evaluate().unwrap().component("a").unwrap(), &visible);
        assert_eq!(base_of_a(&p), base);
        assert!((storage.borrow().component("b").unwrap().norm() - 1.0).abs() < 1e-12);
        assert!(p.init_component("c", None, &mut rng).is_err());
    }

    #[test]
    fn test_registered_component_is_rejected() {
        let mut free = Rn::new(&[3]).unwrap();
        free.register(new_storage(Tensor::zeros(&[3]))).unwrap();
        let components: Vec<(&str, Box<dyn Manifold>)> = vec![
            ("sphere", Box::new(SphereEmbedded::new(&[4], 1.0).unwrap())),
            ("free", Box::new(free)),
        ];
        let err = ProductManifold::new(components).unwrap_err();
        assert!(matches!(err, TrivializationError::AlreadyRegistered { .. }));
        assert!(err.is_lifecycle());
    }
}
