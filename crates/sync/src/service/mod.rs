//! Remote Cart Service contract and adapters.
//!
//! # Architecture
//!
//! - The backend cart is the source of truth once a mutation is acknowledged
//! - Every mutating call carries a client-generated request id; replays of a
//!   queued operation reuse that operation's id so the server can de-dupe
//! - Adapters: [`HttpCartService`] for the REST cart endpoints and
//!   [`MemoryCartService`] for offline development and demos
//!
//! # Example
//!
//! ```rust,ignore
//! use food_cart_sync::CartApiConfig;
//! use food_cart_sync::service::{CartService, HttpCartService};
//!
//! let service = HttpCartService::new(&CartApiConfig::from_env()?)?;
//! let items = service.get().await?;
//! ```

mod http;
mod memory;

pub use http::HttpCartService;
pub use memory::MemoryCartService;

use async_trait::async_trait;
use food_cart_core::{CartItem, OperationData, OperationId, Product, ProductId, SelectedOption};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the Cart Service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Service could not be reached.
    #[error("Cart service unavailable: {0}")]
    Unavailable(String),

    /// Server refused the mutation (e.g., item no longer sold).
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// One line of a batched quantity update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    /// Product id of the line.
    pub id: ProductId,
    /// New quantity.
    pub quantity: u32,
    /// Options identifying the line.
    pub selected_option: Vec<SelectedOption>,
}

/// The remote, authoritative cart.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Fetch the authoritative cart lines.
    async fn get(&self) -> Result<Vec<CartItem>, ServiceError>;

    /// Add `quantity` units of a product line.
    async fn add(
        &self,
        request_id: OperationId,
        product: &Product,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError>;

    /// Set the quantity of a line.
    async fn update(
        &self,
        request_id: OperationId,
        id: &ProductId,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError>;

    /// Remove a line.
    async fn remove(
        &self,
        request_id: OperationId,
        id: &ProductId,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError>;

    /// Remove every line.
    async fn clear(&self, request_id: OperationId) -> Result<(), ServiceError>;

    /// Set several line quantities in one call.
    async fn batch_update(
        &self,
        request_id: OperationId,
        updates: &[ItemUpdate],
    ) -> Result<(), ServiceError>;

    /// Server-side validation (price drift, availability). Returns issue strings.
    async fn validate(&self, items: &[CartItem]) -> Result<Vec<String>, ServiceError>;
}

/// Send a queued intent through the matching service call.
///
/// # Errors
///
/// Returns the service error of the underlying call.
pub async fn send_operation(
    service: &dyn CartService,
    request_id: OperationId,
    operation: &OperationData,
) -> Result<(), ServiceError> {
    match operation {
        OperationData::Add {
            product,
            quantity,
            selected_option,
        } => service.add(request_id, product, *quantity, selected_option).await,
        OperationData::Update {
            id,
            quantity,
            selected_option,
        } => service.update(request_id, id, *quantity, selected_option).await,
        OperationData::Remove {
            id,
            selected_option,
        } => service.remove(request_id, id, selected_option).await,
        OperationData::Clear => service.clear(request_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::Status {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: maintenance");

        let err = ServiceError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }
}
