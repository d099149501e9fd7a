//! Core types for differentiable manifold trivializations.
//!
//! This crate provides the building blocks shared by every trivialization:
//!
//! - [`Tensor`] and [`Value`]: the data flowing through manifolds
//! - [`Manifold`]: forward map, pullback, canonical initialisation and the
//!   registration lifecycle
//! - [`stability`]: elementary functions with well-defined limits, such as
//!   `sinc` and its derivative
//! - [`TrivializationError`]: configuration, lifecycle and numerical errors
//! - [`TrivializationConfig`]: tolerance, output checking and seeding
//!
//! Concrete manifolds live in `geotriv-manifolds`.

pub mod config;
pub mod error;
pub mod manifold;
pub mod named;
pub mod registration;
pub mod stability;
pub mod tensor;
pub mod types;
pub mod value;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{default_config, TrivializationConfig, TrivializationConfigBuilder};
pub use error::{Result, TrivializationError};
pub use manifold::{Description, Manifold};
pub use named::OrderedMap;
pub use registration::Registration;
pub use tensor::Tensor;
pub use types::Scalar;
pub use value::{new_storage, NamedTensors, Signature, Storage, Value};

/// Commonly used items.
pub mod prelude {
    pub use crate::config::{default_config, TrivializationConfig};
    pub use crate::error::{Result, TrivializationError};
    pub use crate::manifold::{Description, Manifold};
    pub use crate::registration::Registration;
    pub use crate::stability::{sinc, sinc_grad};
    pub use crate::tensor::Tensor;
    pub use crate::types::Scalar;
    pub use crate::value::{new_storage, NamedTensors, Signature, Storage, Value};
}
