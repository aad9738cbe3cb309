//! Core types for the cart model.
//!
//! This module provides type-safe wrappers for cart domain concepts.

pub mod cart;
pub mod id;
pub mod operation;
pub mod price;
pub mod validation;

pub use cart::{CartItem, CartModelError, LineKey, Product, SelectedOption};
pub use id::*;
pub use operation::{OperationData, OperationKind, QueuedOperation};
pub use price::Price;
pub use validation::{MAX_ITEM_QUANTITY, MIN_ITEM_QUANTITY, QuantityError};
