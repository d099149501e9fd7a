//! Property-based tests for the sphere maps and the orthogonal retractions.

use geotriv_core::{Manifold, Tensor, Value};
use geotriv_manifolds::{Sphere, SphereEmbedded, SO};
use proptest::prelude::*;

fn vector_strategy(n: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0..10.0_f64, n)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_embedded_sphere_has_radius(
        data in vector_strategy(6),
        r in 0.1..5.0_f64,
    ) {
        prop_assume!(data.iter().map(|x| x * x).sum::<f64>() > 1e-6);
        let m = SphereEmbedded::new(&[6], r).unwrap();
        let x: Value = Tensor::from_vec(&[6], data).unwrap().into();
        let y = m.forward(&x).unwrap();
        prop_assert!((y.norm() - r).abs() < 1e-10 * r.max(1.0));
        // Re-projecting a point on the sphere does not move it.
        let unit = SphereEmbedded::new(&[6], r).unwrap();
        let z = unit.forward(&y).unwrap();
        prop_assert!(z.max_abs_diff(&y) < 1e-12 * r.max(1.0));
    }

    #[test]
    fn prop_exponential_sphere_has_radius(
        data in vector_strategy(4),
        r in 0.1..5.0_f64,
    ) {
        let m = Sphere::new(&[4], r).unwrap();
        let x: Value = Tensor::from_vec(&[4], data).unwrap().into();
        let y = m.forward(&x).unwrap();
        prop_assert!((y.norm() - r).abs() < 1e-10 * r.max(1.0));
    }

    #[test]
    fn prop_rotations_are_orthogonal(data in vector_strategy(16)) {
        for triv in ["expm", "cayley"] {
            let m = SO::with_trivialization(&[4, 4], triv).unwrap();
            let x: Value = Tensor::from_vec(&[4, 4], data.clone()).unwrap().into();
            let y = m.forward(&x).unwrap();
            prop_assert!(m.contains(&y, 1e-8));
        }
    }
}
