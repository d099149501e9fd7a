//! One-shot binding of a manifold to its ambient storage.

use crate::error::{Result, TrivializationError};
use crate::value::Storage;
use std::rc::Rc;
use tracing::debug;

/// Registration state of a manifold.
///
/// Starts unbound. [`Registration::bind`] moves it to bound exactly once and
/// there is no way back.
#[derive(Debug, Default)]
pub struct Registration {
    storage: Option<Storage>,
}

impl Registration {
    /// An unbound registration.
    pub fn new() -> Self {
        Self { storage: None }
    }

    /// Binds `storage`. `manifold` is only used for error messages and logs.
    ///
    /// # Errors
    /// Returns `AlreadyRegistered` if a storage is already bound.
    pub fn bind(&mut self, manifold: &str, storage: Storage) -> Result<()> {
        if self.storage.is_some() {
            return Err(TrivializationError::already_registered(manifold));
        }
        debug!(manifold, "registered ambient storage");
        self.storage = Some(storage);
        Ok(())
    }

    /// Whether a storage is bound.
    pub fn is_bound(&self) -> bool {
        self.storage.is_some()
    }

    /// Borrows the bound storage handle, if any.
    pub fn handle(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    /// A clone of the bound handle.
    ///
    /// # Errors
    /// Returns `NotRegistered` if nothing is bound.
    pub fn storage(&self, manifold: &str) -> Result<Storage> {
        self.storage
            .as_ref()
            .map(Rc::clone)
            .ok_or_else(|| TrivializationError::not_registered(manifold))
    }
}
