//! Scalar maps applied to singular values and eigenvalues.

use geotriv_core::stability::{sigmoid, sigmoid_grad, softplus, softplus_grad};
use geotriv_core::TrivializationError;
use std::fmt;
use std::str::FromStr;

/// Offset added to strictly positive maps so that values stay bounded away
/// from zero in floating point.
pub const POSITIVE_EPSILON: f64 = 5e-6;

/// Maps `ℝ → (0, ∞)` used by fixed-rank and positive-definite manifolds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositiveMap {
    /// `ln(1 + eˣ) + ε`
    #[default]
    Softplus,
    /// `eˣ + ε`
    Exp,
}

impl PositiveMap {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 2] = ["softplus", "exp"];

    /// Applies the map, offset included.
    pub fn apply(self, x: f64) -> f64 {
        let y = match self {
            Self::Softplus => softplus(x),
            Self::Exp => x.exp(),
        };
        y + POSITIVE_EPSILON
    }

    /// Derivative of [`PositiveMap::apply`].
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Softplus => softplus_grad(x),
            Self::Exp => x.exp(),
        }
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Softplus => "softplus",
            Self::Exp => "exp",
        }
    }
}

impl FromStr for PositiveMap {
    type Err = TrivializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "softplus" => Ok(Self::Softplus),
            "exp" => Ok(Self::Exp),
            other => Err(TrivializationError::unknown_trivialization(other, &Self::NAMES)),
        }
    }
}

impl fmt::Display for PositiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps `ℝ → [-1, 1]` used to keep singular values close to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundedMap {
    /// `2σ(x) - 1`
    #[default]
    Sigmoid,
    /// `tanh(x)`
    Tanh,
    /// `sin(x)`
    Sin,
}

impl BoundedMap {
    /// Names accepted by [`FromStr`].
    pub const NAMES: [&'static str; 3] = ["sigmoid", "tanh", "sin"];

    /// Applies the map.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => 2.0 * sigmoid(x) - 1.0,
            Self::Tanh => x.tanh(),
            Self::Sin => x.sin(),
        }
    }

    /// Derivative of [`BoundedMap::apply`].
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => 2.0 * sigmoid_grad(x),
            Self::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Self::Sin => x.cos(),
        }
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Sin => "sin",
        }
    }
}

impl FromStr for BoundedMap {
    type Err = TrivializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "sin" => Ok(Self::Sin),
            other => Err(TrivializationError::unknown_trivialization(other, &Self::NAMES)),
        }
    }
}

impl fmt::Display for BoundedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar map together with its derivative, applied to the diagonal
/// factor of a factorised manifold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagonalMap {
    /// `x`
    Identity,
    /// `|x|`
    Abs,
    /// `f(x) + ε`
    Positive(PositiveMap),
    /// `1 + λ f(x)`
    NearOne {
        /// The bounded map `f`
        map: BoundedMap,
        /// Scale `λ ∈ [0, 1]`
        lambda: f64,
    },
}

impl DiagonalMap {
    /// Applies the map.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Identity => x,
            Self::Abs => x.abs(),
            Self::Positive(f) => f.apply(x),
            Self::NearOne { map, lambda } => 1.0 + lambda * map.apply(x),
        }
    }

    /// Derivative of [`DiagonalMap::apply`].
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Identity => 1.0,
            Self::Abs => x.signum(),
            Self::Positive(f) => f.derivative(x),
            Self::NearOne { map, lambda } => lambda * map.derivative(x),
        }
    }
}

impl fmt::Display for DiagonalMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::Abs => f.write_str("abs"),
            Self::Positive(map) => write!(f, "{map}"),
            Self::NearOne { map, lambda } => write!(f, "1+{lambda}*{map}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn check_derivative(map: DiagonalMap) {
        let h = 1e-6;
        for &x in &[-2.0, -0.3, 0.4, 1.7] {
            let numerical = (map.apply(x + h) - map.apply(x - h)) / (2.0 * h);
            assert_relative_eq!(map.derivative(x), numerical, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_parsing() {
        assert_eq!("exp".parse::<PositiveMap>().unwrap(), PositiveMap::Exp);
        assert_eq!("tanh".parse::<BoundedMap>().unwrap(), BoundedMap::Tanh);
        let err = "relu".parse::<PositiveMap>().unwrap_err();
        assert!(err.is_configuration());
        assert!("cos".parse::<BoundedMap>().is_err());
    }

    #[test]
    fn test_positive_maps_are_positive() {
        for map in [PositiveMap::Softplus, PositiveMap::Exp] {
            for &x in &[-800.0, -10.0, 0.0, 10.0] {
                assert!(map.apply(x) >= POSITIVE_EPSILON);
            }
        }
    }

    #[test]
    fn test_bounded_maps_are_bounded() {
        for map in [BoundedMap::Sigmoid, BoundedMap::Tanh, BoundedMap::Sin] {
            for &x in &[-100.0, -1.0, 0.0, 2.0, 100.0] {
                assert!(map.apply(x).abs() <= 1.0);
            }
            assert_eq!(map.apply(0.0), 0.0);
        }
    }

    #[test]
    fn test_derivatives() {
        check_derivative(DiagonalMap::Identity);
        check_derivative(DiagonalMap::Abs);
        check_derivative(DiagonalMap::Positive(PositiveMap::Softplus));
        check_derivative(DiagonalMap::Positive(PositiveMap::Exp));
        for map in [BoundedMap::Sigmoid, BoundedMap::Tanh, BoundedMap::Sin] {
            check_derivative(DiagonalMap::NearOne { map, lambda: 0.5 });
        }
    }
}
