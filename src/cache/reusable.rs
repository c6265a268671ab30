//! The capability a value needs to be held by the side input cache
//!
//! The cache never looks inside a value. It hands values back to callers and
//! calls [`ReusableInput::reset`] once when it lets go of one.

use crate::error::{CacheError, Result};
use parking_lot::RwLock;

/// A materialized side input that can be reused across bundles.
///
/// Methods take `&self`: values are shared with bundle code through `Arc`, so
/// implementations keep their payload behind interior mutability.
pub trait ReusableInput: Send + Sync {
    /// What [`ReusableInput::value`] hands out
    type Output;

    /// Prepare the value for use. Fails if it cannot be (re)initialized.
    fn init(&self) -> Result<()>;

    /// The held payload
    fn value(&self) -> Self::Output;

    /// Release held resources and clear the payload
    fn reset(&self) -> Result<()>;
}

/// A side input materialized fully in memory.
///
/// `value()` returns a clone of the payload, or `None` after `reset()`.
#[derive(Debug)]
pub struct MaterializedInput<T> {
    payload: RwLock<Option<T>>,
}

impl<T> MaterializedInput<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: RwLock::new(Some(payload)),
        }
    }

    pub fn is_reset(&self) -> bool {
        self.payload.read().is_none()
    }
}

impl<T: Clone + Send + Sync> ReusableInput for MaterializedInput<T> {
    type Output = Option<T>;

    fn init(&self) -> Result<()> {
        if self.is_reset() {
            return Err(CacheError::InitFailure(
                "payload was released and cannot be rebuilt".to_string(),
            ));
        }
        Ok(())
    }

    fn value(&self) -> Option<T> {
        self.payload.read().clone()
    }

    fn reset(&self) -> Result<()> {
        self.payload.write().take();
        Ok(())
    }
}
