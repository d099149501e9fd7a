//! Error types for trivialization operations.
//!
//! Three families of failures exist: configuration errors raised when a
//! manifold is constructed with invalid hyperparameters or shapes, lifecycle
//! errors raised when the registration contract is violated, and numerical
//! errors raised only by genuinely singular linear algebra.

use thiserror::Error;

/// Errors that can occur while building, registering or evaluating a manifold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrivializationError {
    /// A hyperparameter or dimension is outside its valid range.
    #[error("Invalid parameter `{parameter}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter
        parameter: String,
        /// Description of the violated requirement
        reason: String,
    },

    /// A named retraction or eigenvalue map was not recognized.
    #[error("Unknown trivialization `{name}`, expected one of {available:?}")]
    UnknownTrivialization {
        /// The name that was requested
        name: String,
        /// The names that are supported
        available: Vec<String>,
    },

    /// Two consecutive stages of a fibration do not fit together.
    #[error("Fibration stage {stage} expects ambient shape {expected}, previous stage produces {actual}")]
    IncompatibleStages {
        /// Index of the stage whose input does not match
        stage: usize,
        /// Ambient signature declared by the stage
        expected: String,
        /// Output signature of the previous stage
        actual: String,
    },

    /// A tensor does not have the shape a manifold declared.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape
        expected: String,
        /// Actual shape
        actual: String,
    },

    /// `register` was called on a manifold that already holds a storage.
    #[error("Manifold {manifold} is already registered")]
    AlreadyRegistered {
        /// Name of the manifold
        manifold: String,
    },

    /// The storage of a manifold was requested before registration.
    #[error("Manifold {manifold} is not registered")]
    NotRegistered {
        /// Name of the manifold
        manifold: String,
    },

    /// A linear-algebra routine hit a singular input.
    #[error("Numerical failure: {reason}")]
    Numerical {
        /// Description of the numerical issue
        reason: String,
    },
}

impl TrivializationError {
    /// Create an `InvalidParameter` error.
    pub fn invalid_parameter<S1, S2>(parameter: S1, reason: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create an `UnknownTrivialization` error from the requested name and
    /// the supported names.
    pub fn unknown_trivialization<S: Into<String>>(name: S, available: &[&str]) -> Self {
        Self::UnknownTrivialization {
            name: name.into(),
            available: available.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Create an `IncompatibleStages` error.
    pub fn incompatible_stages<S1, S2>(stage: usize, expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::IncompatibleStages {
            stage,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a `ShapeMismatch` error.
    pub fn shape_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an `AlreadyRegistered` error.
    pub fn already_registered<S: Into<String>>(manifold: S) -> Self {
        Self::AlreadyRegistered {
            manifold: manifold.into(),
        }
    }

    /// Create a `NotRegistered` error.
    pub fn not_registered<S: Into<String>>(manifold: S) -> Self {
        Self::NotRegistered {
            manifold: manifold.into(),
        }
    }

    /// Create a `Numerical` error.
    pub fn numerical<S: Into<String>>(reason: S) -> Self {
        Self::Numerical {
            reason: reason.into(),
        }
    }

    /// Whether this error was raised while constructing or configuring a manifold.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::UnknownTrivialization { .. }
                | Self::IncompatibleStages { .. }
                | Self::ShapeMismatch { .. }
        )
    }

    /// Whether this error is a violation of the registration contract.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered { .. } | Self::NotRegistered { .. }
        )
    }
}

/// Result type alias for trivialization operations.
pub type Result<T> = std::result::Result<T, TrivializationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TrivializationError::invalid_parameter("r", "must be positive");
        assert!(matches!(err, TrivializationError::InvalidParameter { .. }));
        assert_eq!(err.to_string(), "Invalid parameter `r`: must be positive");

        let err = TrivializationError::shape_mismatch("(3, 3)", "(4, 4)");
        assert_eq!(err.to_string(), "Shape mismatch: expected (3, 3), got (4, 4)");
    }

    #[test]
    fn test_unknown_trivialization_lists_options() {
        let err = TrivializationError::unknown_trivialization("qr", &["expm", "cayley"]);
        let message = err.to_string();
        assert!(message.contains("`qr`"));
        assert!(message.contains("expm"));
        assert!(message.contains("cayley"));
    }

    #[test]
    fn test_error_taxonomy() {
        assert!(TrivializationError::invalid_parameter("rank", "too large").is_configuration());
        assert!(TrivializationError::incompatible_stages(1, "(3)", "(4)").is_configuration());
        assert!(TrivializationError::already_registered("Sphere").is_lifecycle());
        assert!(TrivializationError::not_registered("Sphere").is_lifecycle());

        let numerical = TrivializationError::numerical("singular R factor");
        assert!(!numerical.is_configuration());
        assert!(!numerical.is_lifecycle());
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            TrivializationError::invalid_parameter("lam", "must lie in [0, 1]"),
            TrivializationError::unknown_trivialization("foo", &["project"]),
            TrivializationError::incompatible_stages(2, "(5, 5)", "(5, 3)"),
            TrivializationError::already_registered("SO"),
            TrivializationError::not_registered("SO"),
            TrivializationError::numerical("singular matrix"),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
