//! Cart line types and the pure operations over a list of lines.
//!
//! Two [`CartItem`]s are the *same line* when their product ids match and
//! their selected option sets are equal, compared by option name without
//! regard to order. A list of lines never holds two same lines: adding a
//! line that already exists merges quantities instead.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::id::{ProductId, VendorId};
use super::operation::OperationData;
use super::price::Price;

/// Errors from line operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartModelError {
    /// No line in the cart matches the requested identity.
    #[error("item {0} is not in the cart")]
    LineNotFound(ProductId),
}

/// A modifier chosen for a line (e.g. "extra cheese").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedOption {
    /// Option name; identity comparisons use this field only.
    pub name: String,
    /// Surcharge for the option.
    pub price: Price,
}

impl SelectedOption {
    /// Create a new option.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Price) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// Catalog descriptor handed to the cart when adding an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product id.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Menu category.
    pub category: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Vendor (restaurant) offering the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorId>,
}

impl Product {
    /// Create a product with the required fields.
    #[must_use]
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Price,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            category: category.into(),
            description: None,
            image: None,
            vendor: None,
        }
    }
}

/// Identity of a cart line: product id plus the set of option names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    /// Product id.
    pub id: ProductId,
    /// Option names, order-insensitive.
    pub options: BTreeSet<String>,
}

impl LineKey {
    /// Build a key from a product id and its selected options.
    #[must_use]
    pub fn new(id: ProductId, options: &[SelectedOption]) -> Self {
        Self {
            id,
            options: options.iter().map(|o| o.name.clone()).collect(),
        }
    }

    /// Whether `item` is this line.
    #[must_use]
    pub fn matches(&self, item: &CartItem) -> bool {
        item.product.id == self.id
            && item.selected_option.len() == self.options.len()
            && item
                .selected_option
                .iter()
                .all(|o| self.options.contains(&o.name))
    }
}

/// One distinct purchasable line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product fields.
    #[serde(flatten)]
    pub product: Product,
    /// Number of units (1..=100 for a valid line).
    pub quantity: u32,
    /// Chosen modifiers, may be empty.
    #[serde(default)]
    pub selected_option: Vec<SelectedOption>,
}

impl CartItem {
    /// Create a new line.
    #[must_use]
    pub const fn new(product: Product, quantity: u32, selected_option: Vec<SelectedOption>) -> Self {
        Self {
            product,
            quantity,
            selected_option,
        }
    }

    /// Product id of the line.
    #[must_use]
    pub const fn id(&self) -> &ProductId {
        &self.product.id
    }

    /// Identity key of the line.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product.id.clone(), &self.selected_option)
    }

    /// Whether `other` is the same line as `self`.
    #[must_use]
    pub fn is_same_line(&self, other: &Self) -> bool {
        self.key().matches(other)
    }

    /// Whether the line carries an option with the given name.
    #[must_use]
    pub fn has_option(&self, name: &str) -> bool {
        self.selected_option.iter().any(|o| o.name == name)
    }

    /// Whether the line matches a lookup by product id and optional option name.
    #[must_use]
    pub fn matches(&self, id: &ProductId, option_name: Option<&str>) -> bool {
        &self.product.id == id && option_name.is_none_or(|name| self.has_option(name))
    }

    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

// =============================================================================
// Line Operations
// =============================================================================

/// Position of the line with the given identity.
#[must_use]
pub fn find_line(items: &[CartItem], key: &LineKey) -> Option<usize> {
    items.iter().position(|item| key.matches(item))
}

/// Position of the first line matching a product id and optional option name.
#[must_use]
pub fn find_matching(items: &[CartItem], id: &ProductId, option_name: Option<&str>) -> Option<usize> {
    items.iter().position(|item| item.matches(id, option_name))
}

/// Add `item` to the list, merging into an existing same line.
///
/// Returns the index of the affected line.
pub fn merge_add(items: &mut Vec<CartItem>, item: CartItem) -> usize {
    if let Some(index) = find_line(items, &item.key())
        && let Some(existing) = items.get_mut(index)
    {
        existing.quantity = existing.quantity.saturating_add(item.quantity);
        return index;
    }
    items.push(item);
    items.len() - 1
}

/// Set the quantity of the line with the given identity.
///
/// # Errors
///
/// Returns [`CartModelError::LineNotFound`] if no line has the identity.
pub fn set_quantity(items: &mut [CartItem], key: &LineKey, quantity: u32) -> Result<usize, CartModelError> {
    let index = find_line(items, key).ok_or_else(|| CartModelError::LineNotFound(key.id.clone()))?;
    if let Some(item) = items.get_mut(index) {
        item.quantity = quantity;
    }
    Ok(index)
}

/// Remove the line with the given identity, returning its position and value.
///
/// # Errors
///
/// Returns [`CartModelError::LineNotFound`] if no line has the identity.
pub fn remove_line(items: &mut Vec<CartItem>, key: &LineKey) -> Result<(usize, CartItem), CartModelError> {
    let index = find_line(items, key).ok_or_else(|| CartModelError::LineNotFound(key.id.clone()))?;
    Ok((index, items.remove(index)))
}

/// Apply a queued intent to a list of lines.
///
/// Used both for the optimistic local write and for rebasing pending intents
/// onto a freshly loaded server cart.
///
/// # Errors
///
/// Returns [`CartModelError::LineNotFound`] when an update or remove targets
/// a line that does not exist.
pub fn apply_operation(items: &mut Vec<CartItem>, operation: &OperationData) -> Result<(), CartModelError> {
    match operation {
        OperationData::Add {
            product,
            quantity,
            selected_option,
        } => {
            merge_add(
                items,
                CartItem::new(product.clone(), *quantity, selected_option.clone()),
            );
        }
        OperationData::Update {
            id,
            quantity,
            selected_option,
        } => {
            set_quantity(items, &LineKey::new(id.clone(), selected_option), *quantity)?;
        }
        OperationData::Remove {
            id,
            selected_option,
        } => {
            remove_line(items, &LineKey::new(id.clone(), selected_option))?;
        }
        OperationData::Clear => items.clear(),
    }
    Ok(())
}

/// Sum of all line quantities.
#[must_use]
pub fn count_items(items: &[CartItem]) -> u32 {
    items.iter().map(|item| item.quantity).sum()
}

/// Sum of price times quantity over all lines.
#[must_use]
pub fn total_price(items: &[CartItem]) -> Price {
    items.iter().map(CartItem::line_total).sum()
}
