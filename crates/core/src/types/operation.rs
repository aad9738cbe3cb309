//! Deferred remote cart mutations.
//!
//! A [`QueuedOperation`] records the *intent* of a mutation (add two of X,
//! set Y to five) rather than the resulting cart, so that operations queued
//! while offline compose correctly when replayed in order.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::{Product, SelectedOption};
use super::id::{OperationId, ProductId};

/// Kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Remove,
    Clear,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// Operation-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationData {
    /// Add `quantity` units of a product line.
    #[serde(rename_all = "camelCase")]
    Add {
        product: Product,
        quantity: u32,
        selected_option: Vec<SelectedOption>,
    },
    /// Set the quantity of an existing line.
    #[serde(rename_all = "camelCase")]
    Update {
        id: ProductId,
        quantity: u32,
        selected_option: Vec<SelectedOption>,
    },
    /// Remove a line.
    #[serde(rename_all = "camelCase")]
    Remove {
        id: ProductId,
        selected_option: Vec<SelectedOption>,
    },
    /// Remove every line.
    Clear,
}

impl OperationData {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Add { .. } => OperationKind::Add,
            Self::Update { .. } => OperationKind::Update,
            Self::Remove { .. } => OperationKind::Remove,
            Self::Clear => OperationKind::Clear,
        }
    }

    /// Product the payload targets, if any.
    #[must_use]
    pub const fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::Add { product, .. } => Some(&product.id),
            Self::Update { id, .. } | Self::Remove { id, .. } => Some(id),
            Self::Clear => None,
        }
    }
}

/// One deferred remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique id, also sent as the idempotency key on replay.
    pub id: OperationId,
    /// Intent to replay.
    pub operation: OperationData,
    /// When the mutation was made.
    pub timestamp: DateTime<Utc>,
    /// Failed drain passes so far.
    pub retries: u32,
}

impl QueuedOperation {
    /// Wrap an intent with a fresh id and the current time.
    #[must_use]
    pub fn new(operation: OperationData) -> Self {
        Self {
            id: OperationId::generate(),
            operation,
            timestamp: Utc::now(),
            retries: 0,
        }
    }

    /// Kind of the wrapped intent.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::price::Price;

    #[test]
    fn test_new_operation_starts_without_retries() {
        let op = QueuedOperation::new(OperationData::Clear);
        assert_eq!(op.retries, 0);
        assert_eq!(op.kind(), OperationKind::Clear);
        assert_eq!(op.operation.product_id(), None);
    }

    #[test]
    fn test_operation_json_is_tagged() {
        let op = OperationData::Remove {
            id: ProductId::new("pho"),
            selected_option: vec![SelectedOption::new("large", Price::from_cents(200))],
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "remove");
        assert_eq!(json["data"]["id"], "pho");
        assert_eq!(json["data"]["selectedOption"][0]["name"], "large");

        let clear = serde_json::to_value(OperationData::Clear).unwrap();
        assert_eq!(clear["type"], "clear");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OperationKind::Add.to_string(), "add");
        assert_eq!(OperationKind::Update.to_string(), "update");
    }
}
