//! Differentiable trivializations that keep tensors on geometric manifolds.
//!
//! An optimizer updates an unconstrained storage tensor; a manifold maps it
//! onto a constraint set every time the parameter is read. Every map comes
//! with an explicit pullback, so gradients flow back to the storage.
//!
//! ```
//! use geotriv::prelude::*;
//! use std::rc::Rc;
//!
//! # fn main() -> geotriv::Result<()> {
//! let mut sphere = SphereEmbedded::new(&[5], 2.0)?;
//! let storage = new_storage(Tensor::full(&[5], 1.0));
//! sphere.register(Rc::clone(&storage))?;
//!
//! let x = sphere.evaluate()?;
//! assert!((x.norm() - 2.0).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! - [`core`]: tensors, errors, configuration and the [`Manifold`] trait
//! - [`manifolds`]: spheres, orthogonal and matrix manifolds, fibrations
//!   and products
//! - `autodiff` (feature `autodiff`): a reverse-mode graph in which the
//!   manifolds take part as operations

pub use geotriv_core as core;
pub use geotriv_manifolds as manifolds;

#[cfg(feature = "autodiff")]
pub use geotriv_autodiff as autodiff;

pub use geotriv_core::{
    default_config, new_storage, Description, Manifold, Result, Signature, Storage, Tensor,
    TrivializationConfig, TrivializationError, Value,
};

// Re-export key dependencies
pub use nalgebra;
pub use rand;

/// Commonly used items from every crate of the workspace.
pub mod prelude {
    pub use geotriv_core::prelude::*;
    pub use geotriv_manifolds::{
        AlmostOrthogonal, FixedRank, Fibration, GLp, Grassmannian, LowRank, ProductManifold, Rn,
        Skew, Sphere, SphereEmbedded, Stiefel, Symmetric, PSD, PSSD, SO,
    };

    #[cfg(feature = "autodiff")]
    pub use geotriv_autodiff::prelude::{
        backward, check_gradients, grad, Graph, NodeId, ParametrizedFunction, SphereGraph,
    };
}
