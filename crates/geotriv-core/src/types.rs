//! Scalar trait and precision-dependent constants.

use num_traits::Float;
use std::fmt::{Debug, Display};

/// Trait for scalar types the elementary functions are defined for (f32 or f64).
///
/// The tolerances are precision dependent: a threshold that is "numerically
/// zero" for `f32` is a perfectly ordinary value for `f64`.
pub trait Scalar: Float + Debug + Display + Default + Send + Sync + 'static {
    /// Below this magnitude `sin(x) / x` is replaced by its limit `1`.
    ///
    /// The smallest positive normal number: only zero and subnormal inputs
    /// make the naive quotient divide by (numerically) zero.
    const SINC_TOLERANCE: Self;

    /// Below this magnitude the derivative of `sinc` is replaced by its limit `0`.
    ///
    /// The closed form `cos(x)/x - sin(x)/x^2` cancels catastrophically long
    /// before it overflows, so this band is much wider than `SINC_TOLERANCE`.
    const SINC_GRAD_TOLERANCE: Self;

    /// Default tolerance for checking that a point satisfies its constraint.
    const MANIFOLD_TOLERANCE: Self;
}

impl Scalar for f32 {
    const SINC_TOLERANCE: Self = f32::MIN_POSITIVE;
    const SINC_GRAD_TOLERANCE: Self = 1e-5;
    const MANIFOLD_TOLERANCE: Self = 1e-4;
}

impl Scalar for f64 {
    const SINC_TOLERANCE: Self = f64::MIN_POSITIVE;
    const SINC_GRAD_TOLERANCE: Self = 1e-10;
    const MANIFOLD_TOLERANCE: Self = 1e-8;
}
