//! Numerically stable elementary functions
//!
//! The retractions need a handful of scalar functions whose naive formula,
//! or whose naive derivative, breaks down at specific inputs. Each one here
//! substitutes the correct limiting value inside a precision-dependent band
//! and is total over the reals: no finite input makes it panic.

use crate::types::Scalar;

/// `sin(x) / x`, with the removable singularity at zero filled in.
///
/// Returns exactly `1` when `|x|` is below [`Scalar::SINC_TOLERANCE`].
pub fn sinc<T: Scalar>(x: T) -> T {
    if x.abs() < T::SINC_TOLERANCE {
        T::one()
    } else {
        x.sin() / x
    }
}

/// Derivative of [`sinc`], `cos(x)/x - sin(x)/x^2`.
///
/// The closed form is evaluated everywhere except inside the band
/// `|x| < T::SINC_GRAD_TOLERANCE`, where it returns the limit `0`.
pub fn sinc_grad<T: Scalar>(x: T) -> T {
    if x.abs() < T::SINC_GRAD_TOLERANCE {
        T::zero()
    } else {
        x.cos() / x - x.sin() / (x * x)
    }
}

/// Logistic function `1 / (1 + exp(-x))`, evaluated without overflow.
pub fn sigmoid<T: Scalar>(x: T) -> T {
    if x >= T::zero() {
        T::one() / (T::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (T::one() + e)
    }
}

/// Derivative of [`sigmoid`].
pub fn sigmoid_grad<T: Scalar>(x: T) -> T {
    let s = sigmoid(x);
    s * (T::one() - s)
}

/// `ln(1 + exp(x))`, evaluated as `max(x, 0) + ln(1 + exp(-|x|))`.
pub fn softplus<T: Scalar>(x: T) -> T {
    x.max(T::zero()) + (-x.abs()).exp().ln_1p()
}

/// Derivative of [`softplus`], which is the logistic function.
pub fn softplus_grad<T: Scalar>(x: T) -> T {
    sigmoid(x)
}

/// `1` for non-negative inputs, `-1` otherwise.
///
/// Unlike `signum`, zero maps to `1`, which is what sign normalisation of
/// triangular factors needs.
pub fn sign_or_one<T: Scalar>(x: T) -> T {
    if x < T::zero() {
        -T::one()
    } else {
        T::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sinc_at_zero() {
        assert_eq!(sinc(0.0_f64), 1.0);
        assert_eq!(sinc(-0.0_f64), 1.0);
        assert_eq!(sinc(0.0_f32), 1.0);
        assert_eq!(sinc(f64::MIN_POSITIVE / 2.0), 1.0);
    }

    #[test]
    fn test_sinc_matches_naive_formula() {
        for &x in &[1e-3, -1e-3, 0.1, 0.5, 1.0, -2.0, 3.0, 10.0, -100.0] {
            assert_relative_eq!(sinc(x), f64::sin(x) / x, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_sinc_is_even_and_continuous() {
        for &x in &[1e-12, 1e-8, 1e-4, 0.3] {
            assert_eq!(sinc(x), sinc(-x));
        }
        assert_relative_eq!(sinc(1e-8_f64), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_sinc_grad_band() {
        assert_eq!(sinc_grad(0.0_f64), 0.0);
        assert_eq!(sinc_grad(1e-11_f64), 0.0);
        assert_eq!(sinc_grad(-1e-11_f64), 0.0);
        assert_eq!(sinc_grad(1e-6_f32), 0.0);
    }

    #[test]
    fn test_sinc_grad_matches_closed_form() {
        for &x in &[1e-2, 0.1, 0.7, 1.0, -1.5, 4.0] {
            let expected = f64::cos(x) / x - f64::sin(x) / (x * x);
            assert_relative_eq!(sinc_grad(x), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sinc_grad_matches_finite_differences() {
        let h = 1e-6;
        for &x in &[0.2, 1.0, 2.5, -0.8] {
            let numerical = (sinc(x + h) - sinc(x - h)) / (2.0 * h);
            assert_relative_eq!(sinc_grad(x), numerical, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_sinc_is_total() {
        for &x in &[f64::MAX, f64::MIN, 1e300, -1e-300] {
            assert!(sinc(x).is_finite());
            assert!(sinc_grad(x).is_finite());
        }
    }

    #[test]
    fn test_softplus_is_stable() {
        assert_relative_eq!(softplus(0.0_f64), 2.0_f64.ln(), epsilon = 1e-15);
        assert_relative_eq!(softplus(1000.0_f64), 1000.0, epsilon = 1e-12);
        assert!(softplus(-1000.0_f64) >= 0.0);
        assert!(softplus(1000.0_f64).is_finite());
        assert_relative_eq!(softplus_grad(0.0_f64), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_sigmoid_tails() {
        assert_relative_eq!(sigmoid(0.0_f64), 0.5);
        assert!(sigmoid(-800.0_f64) >= 0.0);
        assert!(sigmoid(800.0_f64) <= 1.0);
        assert_relative_eq!(sigmoid_grad(0.0_f64), 0.25);
    }

    #[test]
    fn test_sign_or_one() {
        assert_eq!(sign_or_one(0.0_f64), 1.0);
        assert_eq!(sign_or_one(-3.0_f64), -1.0);
        assert_eq!(sign_or_one(2.0_f32), 1.0);
    }
}
