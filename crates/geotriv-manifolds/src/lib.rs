//! Geotriv Manifolds - Concrete trivializations onto constrained sets.
//!
//! Every type in this crate implements [`geotriv_core::Manifold`]: a map
//! from an unconstrained ambient tensor onto a manifold, its pullback, and a
//! canonical initialisation. Larger manifolds are assembled out of smaller
//! ones with [`Fibration`] (sequential composition) and [`ProductManifold`]
//! (independent named components).

/// Implements `Manifold` for a type holding its definition in
/// `self.inner: Fibration`. The type provides
/// `fn is_member(&self, &Value, f64) -> bool` for the membership check.
macro_rules! delegate_to_fibration {
    ($ty:ty) => {
        impl geotriv_core::Manifold for $ty {
            fn name(&self) -> &str {
                geotriv_core::Manifold::name(&self.inner)
            }

            fn ambient_signature(&self) -> geotriv_core::Signature {
                geotriv_core::Manifold::ambient_signature(&self.inner)
            }

            fn output_signature(&self) -> geotriv_core::Signature {
                geotriv_core::Manifold::output_signature(&self.inner)
            }

            fn forward(&self, x: &geotriv_core::Value) -> geotriv_core::Result<geotriv_core::Value> {
                geotriv_core::Manifold::forward(&self.inner, x)
            }

            fn pullback(
                &self,
                x: &geotriv_core::Value,
                grad: &geotriv_core::Value,
            ) -> geotriv_core::Result<geotriv_core::Value> {
                geotriv_core::Manifold::pullback(&self.inner, x, grad)
            }

            fn canonical_init(
                &mut self,
                storage: Option<&mut geotriv_core::Value>,
                rng: &mut dyn rand::RngCore,
            ) -> geotriv_core::Result<()> {
                geotriv_core::Manifold::canonical_init(&mut self.inner, storage, rng)
            }

            fn contains(&self, value: &geotriv_core::Value, tol: f64) -> bool {
                self.is_member(value, tol)
            }

            fn describe(&self) -> geotriv_core::Description {
                geotriv_core::Manifold::describe(&self.inner)
            }

            fn registration(&self) -> &geotriv_core::Registration {
                geotriv_core::Manifold::registration(&self.inner)
            }

            fn registration_mut(&mut self) -> &mut geotriv_core::Registration {
                geotriv_core::Manifold::registration_mut(&mut self.inner)
            }
        }
    };
}

pub mod almost_orthogonal;
pub mod factorized;
pub mod fibered;
pub mod glp;
pub mod grassmannian;
pub mod low_rank;
pub mod product;
pub mod psd;
pub mod reals;
pub mod skew;
pub mod so;
pub mod spectral;
pub mod sphere;
pub mod stages;
pub mod stiefel;
pub mod symmetric;
pub mod utils;

// Re-export main manifolds for convenience
pub use almost_orthogonal::AlmostOrthogonal;
pub use factorized::{Combine, Split, SymmetricCombine, SymmetricSplit};
pub use fibered::Fibration;
pub use glp::GLp;
pub use grassmannian::{Grassmannian, GrassmannianTall};
pub use low_rank::{FixedRank, LowRank};
pub use product::ProductManifold;
pub use psd::{PSSDFixedRank, PSSDLowRank, PSD, PSSD};
pub use reals::Rn;
pub use skew::Skew;
pub use so::{OrthogonalMap, SO};
pub use spectral::{BoundedMap, DiagonalMap, PositiveMap, POSITIVE_EPSILON};
pub use sphere::{Sphere, SphereEmbedded};
pub use stages::{PadColumns, TakeColumns, Transpose};
pub use stiefel::{Stiefel, StiefelTall};
pub use symmetric::Symmetric;
