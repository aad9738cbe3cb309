//! Error type returned by the Cart Store.
//!
//! Offline deferrals are not errors: they succeed with
//! [`crate::state::MutationOutcome::Queued`].

use food_cart_core::{CartModelError, ProductId, QuantityError};
use thiserror::Error;

use crate::service::ServiceError;
use crate::storage::StorageError;

/// Errors surfaced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Requested quantity is outside the allowed range.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    /// Request rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No matching line in the cart.
    #[error("Item {0} is not in the cart")]
    ItemNotFound(ProductId),

    /// Remote call failed after every attempt; local state was rolled back.
    #[error("Cart sync failed: {0}")]
    Remote(#[from] ServiceError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation needs a connection.
    #[error("Cart is offline")]
    Offline,
}

impl From<CartModelError> for CartError {
    fn from(err: CartModelError) -> Self {
        match err {
            CartModelError::LineNotFound(id) => Self::ItemNotFound(id),
        }
    }
}

/// Result alias for cart operations.
pub type Result<T> = std::result::Result<T, CartError>;
