//! Integration tests for automatic differentiation with manifolds.

use approx::assert_relative_eq;
use geotriv_autodiff::ops::{LastAxisDot, Multiply, Sum};
use geotriv_autodiff::prelude::*;
use geotriv_core::{new_storage, Manifold, Tensor, Value};
use geotriv_manifolds::{Sphere, SphereEmbedded, Stiefel, SO};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;

fn pullback(manifold: &dyn Manifold, x: &Tensor, g: &Tensor) -> Tensor {
    manifold
        .pullback(&Value::from(x.clone()), &Value::from(g.clone()))
        .unwrap()
        .into_tensor()
        .unwrap()
}

/// Gradient of `<out, g>` w.r.t. `input` for a graph whose output is `out`.
fn graph_gradient(graph: &Graph, out: NodeId, input: NodeId, g: &Tensor) -> Tensor {
    backward(graph, out, Some(g.clone())).unwrap().remove(&input).unwrap()
}

#[test]
fn test_projection_graph_matches_embedded_pullback() {
    let mut rng = StdRng::seed_from_u64(0);
    let sphere = SphereEmbedded::new(&[3, 4], 2.5).unwrap();
    let x = Tensor::randn(&[3, 4], &mut rng);
    let g = Tensor::randn(&[3, 4], &mut rng);

    let graph = Graph::new();
    let input = graph.variable(x.clone());
    let out = graph.project_sphere(input.id, 2.5);

    let forward = sphere.forward(&Value::from(x.clone())).unwrap().into_tensor().unwrap();
    assert!(graph.forward(out).unwrap().max_abs_diff(&forward) < 1e-12);
    let expected = pullback(&sphere, &x, &g);
    assert!(graph_gradient(&graph, out, input.id, &g).max_abs_diff(&expected) < 1e-12);
}

#[test]
fn test_exponential_graph_matches_sphere_pullback() {
    let mut rng = StdRng::seed_from_u64(1);
    let sphere = Sphere::new(&[2, 5], 1.5).unwrap();
    let v = Tensor::randn(&[2, 5], &mut rng);
    let g = Tensor::randn(&[2, 5], &mut rng);

    let graph = Graph::new();
    let base = graph.constant(sphere.base());
    let input = graph.variable(v.clone());
    let out = graph.sphere_exponential(base, input.id, sphere.radius());

    let forward = sphere.forward(&Value::from(v.clone())).unwrap().into_tensor().unwrap();
    assert!(graph.forward(out).unwrap().max_abs_diff(&forward) < 1e-10);
    let expected = pullback(&sphere, &v, &g);
    assert!(graph_gradient(&graph, out, input.id, &g).max_abs_diff(&expected) < 1e-10);
}

#[test]
fn test_exponential_gradient_at_zero_tangent() {
    let mut rng = StdRng::seed_from_u64(2);
    let sphere = Sphere::new(&[4], 1.0).unwrap();
    let zero = Tensor::zeros(&[4]);
    let g = Tensor::randn(&[4], &mut rng);

    let graph = Graph::new();
    let base = graph.constant(sphere.base());
    let input = graph.variable(zero.clone());
    let out = graph.sphere_exponential(base, input.id, 1.0);

    assert!(graph.forward(out).unwrap().max_abs_diff(&sphere.base()) < 1e-12);
    let gradient = graph_gradient(&graph, out, input.id, &g);
    assert!(gradient.is_finite());
    // At v = 0 the differential is the tangent projection at the base.
    assert!(gradient.max_abs_diff(&pullback(&sphere, &zero, &g)) < 1e-12);
}

#[test]
fn test_graph_nodes_for_matrix_manifolds() {
    let mut rng = StdRng::seed_from_u64(3);
    let manifolds: Vec<Rc<dyn Manifold>> = vec![
        Rc::new(Stiefel::new(&[5, 2]).unwrap()),
        Rc::new(Stiefel::with_trivialization(&[2, 4], "cayley").unwrap()),
        Rc::new(SO::new(&[3, 3]).unwrap()),
    ];
    for manifold in manifolds {
        let shape = manifold.ambient_signature().as_shape().unwrap().to_vec();
        let out_shape = manifold.output_signature().as_shape().unwrap().to_vec();
        let graph = Graph::new();
        let x = graph.variable(Tensor::randn(&shape, &mut rng).scale(0.5));
        let y = graph.trivialize(x.id, Rc::clone(&manifold)).unwrap();
        let weights = graph.constant(Tensor::randn(&out_shape, &mut rng));
        let product = graph.apply_op(Box::new(Multiply), &[y, weights]);
        let loss = graph.apply_op(Box::new(Sum), &[product]);
        let error = check_gradients(&graph, loss, x.id, 1e-6).unwrap();
        assert!(error < 1e-6, "{}: {error}", manifold.describe());
    }
}

#[test]
fn test_parametrized_function_gradient() {
    let mut rng = StdRng::seed_from_u64(4);
    let mut stiefel = Stiefel::new(&[4, 2]).unwrap();
    let storage = new_storage(Tensor::zeros(&[4, 2]));
    stiefel.register(Rc::clone(&storage)).unwrap();
    stiefel.uniform_init(&mut rng).unwrap();
    storage.borrow_mut().as_tensor_mut().unwrap().fill_randn(&mut rng);

    let weights = Tensor::randn(&[4, 2], &mut rng);
    let f = ParametrizedFunction::new(Rc::new(stiefel), move |graph, point| {
        let weights = graph.constant(weights.clone());
        let product = graph.apply_op(Box::new(Multiply), &[point, weights]);
        Ok(graph.apply_op(Box::new(Sum), &[product]))
    })
    .unwrap();

    let (value, gradient) = f.value_and_grad().unwrap();
    assert_relative_eq!(value, f.value().unwrap());

    let original = storage.borrow().as_tensor().unwrap().clone();
    let h = 1e-6;
    for i in 0..original.len() {
        let mut shifted = original.clone();
        shifted.as_mut_slice()[i] += h;
        *storage.borrow_mut() = shifted.into();
        let plus = f.value().unwrap();

        let mut shifted = original.clone();
        shifted.as_mut_slice()[i] -= h;
        *storage.borrow_mut() = shifted.into();
        let minus = f.value().unwrap();

        let numerical = (plus - minus) / (2.0 * h);
        assert_relative_eq!(gradient.as_slice()[i], numerical, epsilon = 1e-6);
    }
}

#[test]
fn test_gradient_flows_into_base_point() {
    // The base is a variable here: the graph differentiates both arguments.
    let graph = Graph::new();
    let base = graph.variable(Tensor::from_vec(&[3], vec![0.3, 1.0, -0.5]).unwrap());
    let v = graph.variable(Tensor::from_vec(&[3], vec![0.2, -0.1, 0.4]).unwrap());
    let out = graph.sphere_exponential(base.id, v.id, 2.0);
    let w = graph.constant(Tensor::from_vec(&[3], vec![1.0, -1.0, 0.5]).unwrap());
    let loss = graph.apply_op(Box::new(LastAxisDot), &[out, w]);
    assert!(check_gradients(&graph, loss, base.id, 1e-6).unwrap() < 1e-6);
    assert!(check_gradients(&graph, loss, v.id, 1e-6).unwrap() < 1e-6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_exponential_graph_stays_on_sphere(
        v in prop::collection::vec(-3.0f64..3.0, 4),
        r in 0.1f64..5.0,
    ) {
        let graph = Graph::new();
        let base = graph.constant(Tensor::from_vec(&[4], vec![1.0, 0.0, 0.0, 0.0]).unwrap());
        let input = graph.variable(Tensor::from_vec(&[4], v).unwrap());
        let out = graph.sphere_exponential(base, input.id, r);
        let value = graph.forward(out).unwrap();
        prop_assert!((value.norm() - r).abs() < 1e-10 * r.max(1.0));
    }
}
