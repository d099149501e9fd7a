//! Runtime configuration for evaluation and initialisation.

use crate::error::{Result, TrivializationError};
use crate::types::Scalar;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings shared by every manifold of a host.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrivializationConfig {
    /// Tolerance used when checking that an evaluated value is on its manifold.
    pub tolerance: f64,
    /// Whether `evaluate` verifies the constraint of every value it returns.
    pub check_output: bool,
    /// Seed for canonical initialisation. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl TrivializationConfig {
    /// Creates a builder starting from the default settings.
    pub fn builder() -> TrivializationConfigBuilder {
        TrivializationConfigBuilder::new()
    }

    /// Random number generator for initialisation.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for TrivializationConfig {
    fn default() -> Self {
        Self {
            tolerance: f64::MANIFOLD_TOLERANCE,
            check_output: false,
            seed: None,
        }
    }
}

/// Process-wide default configuration.
pub static DEFAULT_CONFIG: Lazy<TrivializationConfig> = Lazy::new(TrivializationConfig::default);

/// Get the default configuration.
pub fn default_config() -> &'static TrivializationConfig {
    &DEFAULT_CONFIG
}

/// Builder for [`TrivializationConfig`].
#[derive(Debug, Clone)]
pub struct TrivializationConfigBuilder {
    config: TrivializationConfig,
}

impl TrivializationConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: TrivializationConfig::default(),
        }
    }

    /// Set the membership tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Enable or disable the output check in `evaluate`.
    pub fn check_output(mut self, check_output: bool) -> Self {
        self.config.check_output = check_output;
        self
    }

    /// Make initialisation reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the tolerance is not a positive finite number.
    pub fn build(self) -> Result<TrivializationConfig> {
        let tolerance = self.config.tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(TrivializationError::invalid_parameter(
                "tolerance",
                format!("must be positive and finite, got {tolerance}"),
            ));
        }
        Ok(self.config)
    }
}

impl Default for TrivializationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
