//! In-process Cart Service.
//!
//! Keeps the authoritative lines in memory and applies mutations with the
//! same line operations the client uses. Request ids that were already
//! applied are acknowledged without being applied again.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use food_cart_core::cart::{self, LineKey};
use food_cart_core::{CartItem, OperationData, OperationId, Product, ProductId, SelectedOption};
use parking_lot::Mutex;
use tracing::debug;

use super::{CartService, ItemUpdate, ServiceError};

/// Cart Service backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryCartService {
    inner: Mutex<MemoryCart>,
}

#[derive(Debug, Default)]
struct MemoryCart {
    items: Vec<CartItem>,
    applied: HashSet<OperationId>,
    catalog: HashMap<ProductId, Product>,
}

impl MemoryCartService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service whose cart already holds `items`.
    #[must_use]
    pub fn with_items(items: Vec<CartItem>) -> Self {
        let service = Self::new();
        service.inner.lock().items = items;
        service
    }

    /// Register catalog entries used by [`CartService::validate`].
    #[must_use]
    pub fn with_catalog(self, products: impl IntoIterator<Item = Product>) -> Self {
        {
            let mut inner = self.inner.lock();
            inner
                .catalog
                .extend(products.into_iter().map(|p| (p.id.clone(), p)));
        }
        self
    }

    /// Current authoritative lines.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner.lock().items.clone()
    }

    /// Number of distinct request ids applied so far.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.inner.lock().applied.len()
    }

    fn apply(&self, request_id: OperationId, operation: &OperationData) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.applied.contains(&request_id) {
            debug!(%request_id, "Duplicate request acknowledged without applying");
            return Ok(());
        }
        cart::apply_operation(&mut inner.items, operation)
            .map_err(|e| ServiceError::Rejected(e.to_string()))?;
        inner.applied.insert(request_id);
        Ok(())
    }
}

#[async_trait]
impl CartService for MemoryCartService {
    async fn get(&self) -> Result<Vec<CartItem>, ServiceError> {
        Ok(self.items())
    }

    async fn add(
        &self,
        request_id: OperationId,
        product: &Product,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.apply(
            request_id,
            &OperationData::Add {
                product: product.clone(),
                quantity,
                selected_option: options.to_vec(),
            },
        )
    }

    async fn update(
        &self,
        request_id: OperationId,
        id: &ProductId,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.apply(
            request_id,
            &OperationData::Update {
                id: id.clone(),
                quantity,
                selected_option: options.to_vec(),
            },
        )
    }

    async fn remove(
        &self,
        request_id: OperationId,
        id: &ProductId,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.apply(
            request_id,
            &OperationData::Remove {
                id: id.clone(),
                selected_option: options.to_vec(),
            },
        )
    }

    async fn clear(&self, request_id: OperationId) -> Result<(), ServiceError> {
        self.apply(request_id, &OperationData::Clear)
    }

    async fn batch_update(
        &self,
        request_id: OperationId,
        updates: &[ItemUpdate],
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.applied.contains(&request_id) {
            return Ok(());
        }
        // Validate every line before touching any of them.
        for update in updates {
            let key = LineKey::new(update.id.clone(), &update.selected_option);
            if cart::find_line(&inner.items, &key).is_none() {
                return Err(ServiceError::Rejected(format!(
                    "item {} is not in the cart",
                    update.id
                )));
            }
        }
        for update in updates {
            let key = LineKey::new(update.id.clone(), &update.selected_option);
            cart::set_quantity(&mut inner.items, &key, update.quantity)
                .map_err(|e| ServiceError::Rejected(e.to_string()))?;
        }
        inner.applied.insert(request_id);
        Ok(())
    }

    async fn validate(&self, items: &[CartItem]) -> Result<Vec<String>, ServiceError> {
        let inner = self.inner.lock();
        if inner.catalog.is_empty() {
            return Ok(Vec::new());
        }
        let issues = items
            .iter()
            .filter_map(|item| match inner.catalog.get(item.id()) {
                None => Some(format!("{} is no longer available", item.product.name)),
                Some(product) if product.price != item.product.price => Some(format!(
                    "{}: price changed from {} to {}",
                    item.product.name, item.product.price, product.price
                )),
                Some(_) => None,
            })
            .collect();
        Ok(issues)
    }
}
