//! Cart validation predicates.
//!
//! An item is valid iff its quantity lies in
//! [`MIN_ITEM_QUANTITY`]..=[`MAX_ITEM_QUANTITY`] and its price is not
//! negative. Whole-cart validation returns human-readable issue strings; an
//! empty list means the cart is valid.

use std::collections::HashSet;

use super::cart::CartItem;

/// Smallest quantity a cart line may hold.
pub const MIN_ITEM_QUANTITY: u32 = 1;

/// Largest quantity a cart line may hold.
pub const MAX_ITEM_QUANTITY: u32 = 100;

/// Errors produced when a requested quantity is outside the allowed range.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The quantity is below the minimum.
    #[error("quantity must be at least {min} (got {got})")]
    BelowMinimum {
        /// Requested quantity.
        got: i64,
        /// Minimum allowed quantity.
        min: u32,
    },
    /// The quantity is above the maximum.
    #[error("quantity must be at most {max} (got {got})")]
    AboveMaximum {
        /// Requested quantity.
        got: i64,
        /// Maximum allowed quantity.
        max: u32,
    },
}

/// Check a requested quantity and narrow it to a line quantity.
///
/// # Errors
///
/// Returns [`QuantityError`] if the quantity is outside 1..=100.
pub fn check_quantity(quantity: i64) -> Result<u32, QuantityError> {
    if quantity < i64::from(MIN_ITEM_QUANTITY) {
        return Err(QuantityError::BelowMinimum {
            got: quantity,
            min: MIN_ITEM_QUANTITY,
        });
    }
    if quantity > i64::from(MAX_ITEM_QUANTITY) {
        return Err(QuantityError::AboveMaximum {
            got: quantity,
            max: MAX_ITEM_QUANTITY,
        });
    }
    u32::try_from(quantity).map_err(|_| QuantityError::AboveMaximum {
        got: quantity,
        max: MAX_ITEM_QUANTITY,
    })
}

/// Whether a single item satisfies the quantity and price rules.
#[must_use]
pub fn is_valid_item(item: &CartItem) -> bool {
    (MIN_ITEM_QUANTITY..=MAX_ITEM_QUANTITY).contains(&item.quantity)
        && !item.product.price.is_negative()
}

/// Issues for a single item.
#[must_use]
pub fn item_issues(item: &CartItem) -> Vec<String> {
    let mut issues = Vec::new();
    if !(MIN_ITEM_QUANTITY..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
        issues.push(format!(
            "{}: quantity must be between {MIN_ITEM_QUANTITY} and {MAX_ITEM_QUANTITY} (got {})",
            item.product.name, item.quantity
        ));
    }
    if item.product.price.is_negative() {
        issues.push(format!(
            "{}: price cannot be negative (got {})",
            item.product.name, item.product.price
        ));
    }
    for option in &item.selected_option {
        if option.price.is_negative() {
            issues.push(format!(
                "{}: option '{}' has a negative price",
                item.product.name, option.name
            ));
        }
    }
    issues
}

/// Validate every line of a cart, including the one-line-per-identity rule.
#[must_use]
pub fn validate_items(items: &[CartItem]) -> Vec<String> {
    let mut issues: Vec<String> = items.iter().flat_map(item_issues).collect();

    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.key()) {
            issues.push(format!("{}: duplicate cart line", item.product.name));
        }
    }

    issues
}

/// Validation gate run before checkout.
///
/// Same as [`validate_items`] but an empty cart is an issue.
#[must_use]
pub fn checkout_issues(items: &[CartItem]) -> Vec<String> {
    if items.is_empty() {
        return vec!["Cart is empty".to_string()];
    }
    validate_items(items)
}
