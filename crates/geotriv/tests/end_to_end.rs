//! End-to-end tests through the facade crate.

use approx::assert_relative_eq;
use geotriv::prelude::*;
use geotriv::rand::rngs::StdRng;
use geotriv::rand::SeedableRng;
use pretty_assertions::assert_eq;
use std::rc::Rc;

#[test]
fn test_embedded_sphere_on_constant_vector() {
    let mut sphere = SphereEmbedded::new(&[5], 2.0).unwrap();
    let storage = new_storage(Tensor::full(&[5], 1.0));
    sphere.register(Rc::clone(&storage)).unwrap();

    let x = sphere.evaluate().unwrap().into_tensor().unwrap();
    assert_relative_eq!(x.norm(), 2.0, epsilon = 1e-12);
    // Parallel to the input: every entry is 2 / sqrt(5).
    for &xi in x.as_slice() {
        assert_relative_eq!(xi, 2.0 / 5f64.sqrt(), epsilon = 1e-12);
    }
}

#[test]
fn test_lifecycle() {
    let mut sphere = Sphere::new(&[3, 4], 1.0).unwrap();
    assert!(!sphere.is_registered());
    assert!(sphere.original_tensor().unwrap_err().is_lifecycle());
    assert!(sphere.evaluate().is_err());

    let wrong = new_storage(Tensor::zeros(&[4, 3]));
    assert!(sphere.register(wrong).unwrap_err().is_configuration());
    assert!(!sphere.is_registered());

    let storage = new_storage(Tensor::zeros(&[3, 4]));
    sphere.register(Rc::clone(&storage)).unwrap();
    assert!(Rc::ptr_eq(&sphere.original_tensor().unwrap(), &storage));
    let again = sphere.register(new_storage(Tensor::zeros(&[3, 4])));
    assert!(matches!(again, Err(TrivializationError::AlreadyRegistered { .. })));

    // A zero storage evaluates to the base.
    let config = TrivializationConfig::builder().check_output(true).seed(11).build().unwrap();
    sphere.initialize(&config).unwrap();
    let value = sphere.evaluate_with(&config).unwrap();
    assert_eq!(value.as_tensor().unwrap(), &sphere.base());
}

#[test]
fn test_seeded_initialisation_is_reproducible() {
    let config = TrivializationConfig::builder().seed(5).build().unwrap();
    let values: Vec<Value> = (0..2)
        .map(|_| {
            let mut m = Stiefel::new(&[2, 5, 3]).unwrap();
            let storage = new_storage(Tensor::zeros(&[2, 5, 3]));
            m.register(Rc::clone(&storage)).unwrap();
            m.initialize(&config).unwrap();
            m.evaluate().unwrap()
        })
        .collect();
    assert_eq!(values[0], values[1]);
}

#[test]
fn test_fibration_law() {
    let mut rng = StdRng::seed_from_u64(0);
    let fibration = Fibration::new(vec![
        Box::new(Skew::new(&[3, 3]).unwrap()) as Box<dyn Manifold>,
        Box::new(SO::new(&[3, 3]).unwrap()),
    ])
    .unwrap();
    let a = &fibration.stages()[0];
    let b = &fibration.stages()[1];

    let x: Value = Tensor::randn(&[3, 3], &mut rng).into();
    let composed = fibration.forward(&x).unwrap();
    let chained = b.forward(&a.forward(&x).unwrap()).unwrap();
    assert_eq!(composed, chained);
    assert!(b.contains(&composed, 1e-10));

    let mismatch = Fibration::new(vec![
        Box::new(Rn::new(&[3]).unwrap()) as Box<dyn Manifold>,
        Box::new(SO::new(&[3, 3]).unwrap()),
    ]);
    assert!(matches!(
        mismatch,
        Err(TrivializationError::IncompatibleStages { stage: 1, .. })
    ));
}

#[test]
fn test_product_of_spheres() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut product = ProductManifold::new(vec![
        ("direction", Box::new(SphereEmbedded::new(&[3], 1.0).unwrap()) as Box<dyn Manifold>),
        ("frame", Box::new(Stiefel::new(&[4, 2]).unwrap()) as Box<dyn Manifold>),
    ])
    .unwrap();
    let storage = new_storage(product.ambient_signature().zeros());
    product.register(Rc::clone(&storage)).unwrap();
    product.uniform_init(&mut rng).unwrap();

    let value = product.evaluate().unwrap();
    let names: Vec<&str> = value.as_named().unwrap().keys().collect();
    assert_eq!(names, vec!["direction", "frame"]);
    assert!(product.contains(&value, 1e-10));
}

#[cfg(feature = "autodiff")]
#[test]
fn test_gradient_descent_through_the_sphere() {
    use geotriv::autodiff::ops::{LastAxisDot, Sum};

    // Minimise <x, c> over the unit sphere; the minimiser is -c.
    let c = Tensor::from_vec(&[3], vec![1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]).unwrap();
    let mut sphere = SphereEmbedded::new(&[3], 1.0).unwrap();
    let storage = new_storage(Tensor::from_vec(&[3], vec![1.0, 0.5, -2.0]).unwrap());
    sphere.register(Rc::clone(&storage)).unwrap();
    let sphere: Rc<dyn Manifold> = Rc::new(sphere);

    let target = c.clone();
    let f = ParametrizedFunction::new(Rc::clone(&sphere), move |graph, point| {
        let target = graph.constant(target.clone());
        let dot = graph.apply_op(Box::new(LastAxisDot), &[point, target]);
        Ok(graph.apply_op(Box::new(Sum), &[dot]))
    })
    .unwrap();

    for _ in 0..300 {
        let (_, gradient) = f.value_and_grad().unwrap();
        let updated = storage
            .borrow()
            .as_tensor()
            .unwrap()
            .zip_map(&gradient, |x, g| x - 0.5 * g)
            .unwrap();
        *storage.borrow_mut() = updated.into();
    }

    assert_relative_eq!(f.value().unwrap(), -1.0, epsilon = 1e-6);
    let x = sphere.evaluate().unwrap().into_tensor().unwrap();
    assert!(x.max_abs_diff(&c.scale(-1.0)) < 1e-3);
}
