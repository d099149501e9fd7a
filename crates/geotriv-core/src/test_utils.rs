//! Helpers for testing manifolds: random values and finite-difference checks.

use crate::error::Result;
use crate::manifold::Manifold;
use crate::tensor::Tensor;
use crate::value::{Signature, Value};
use rand::Rng;

/// A value with the given signature and standard normal entries.
pub fn random_value<R: Rng + ?Sized>(signature: &Signature, rng: &mut R) -> Value {
    match signature {
        Signature::Tensor(shape) => Value::Tensor(Tensor::randn(shape, rng)),
        Signature::Named(shapes) => {
            let mut named = crate::value::NamedTensors::new();
            for (name, shape) in shapes.iter() {
                named.insert(name, Tensor::randn(shape, rng));
            }
            Value::Named(named)
        }
    }
}

/// Compares [`Manifold::pullback`] against central finite differences.
///
/// For every ambient coordinate `i` the directional derivative
/// `⟨grad, (φ(x + h eᵢ) - φ(x - h eᵢ)) / 2h⟩` is compared with the `i`-th
/// entry of `pullback(x, grad)`. Returns the largest absolute error divided
/// by `max(1, largest entry)`.
pub fn pullback_error<M: Manifold + ?Sized>(
    manifold: &M,
    x: &Value,
    grad: &Value,
    h: f64,
) -> Result<f64> {
    let analytic = manifold.pullback(x, grad)?.to_flat();
    let base = x.to_flat();

    let mut numerical = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut plus = base.clone();
        plus[i] += h;
        let mut minus = base.clone();
        minus[i] -= h;
        let f_plus = manifold.forward(&x.with_flat(&plus)?)?;
        let f_minus = manifold.forward(&x.with_flat(&minus)?)?;
        numerical.push((grad.dot(&f_plus)? - grad.dot(&f_minus)?) / (2.0 * h));
    }

    let scale = numerical.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    let error = analytic
        .iter()
        .zip(&numerical)
        .map(|(a, n)| (a - n).abs())
        .fold(0.0, f64::max);
    Ok(error / scale)
}

/// Draws a random point and cotangent, then returns [`pullback_error`].
pub fn random_pullback_error<M, R>(manifold: &M, rng: &mut R, h: f64) -> Result<f64>
where
    M: Manifold + ?Sized,
    R: Rng + ?Sized,
{
    let x = random_value(&manifold.ambient_signature(), rng);
    let grad = random_value(&manifold.output_signature(), rng);
    pullback_error(manifold, &x, &grad, h)
}

/// Sample mean and covariance of a set of vectors.
pub fn mean_and_covariance(samples: &[Vec<f64>]) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = samples.first().map_or(0, Vec::len);
    let count = samples.len() as f64;

    let mut mean = vec![0.0; n];
    for s in samples {
        for (m, v) in mean.iter_mut().zip(s) {
            *m += v / count;
        }
    }

    let mut cov = vec![vec![0.0; n]; n];
    for s in samples {
        for i in 0..n {
            for j in 0..n {
                cov[i][j] += (s[i] - mean[i]) * (s[j] - mean[j]) / count;
            }
        }
    }
    (mean, cov)
}
