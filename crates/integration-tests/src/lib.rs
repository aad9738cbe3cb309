//! Integration tests for the food cart sync engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p food-cart-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_identity` - Line identity and merging
//! - `cart_rollback` - Optimistic updates undone after remote failure
//! - `offline_replay` - Offline edits replayed on reconnect
//! - `offline_queue` - Queue ordering, bounded retries and eviction
//! - `batch_update` - All-or-nothing batched quantity changes
//! - `cart_load` - Server load, backup fallback and session lifecycle
//! - `cart_totals` - Derived count and total
//! - `cart_validate` - Local and server validation
//!
//! Everything runs in process: [`MockCartService`] plays the backend and
//! `MemoryStore` the device storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use food_cart_core::{CartItem, OperationId, Price, Product, ProductId, SelectedOption};
use food_cart_sync::service::{CartService, ItemUpdate, MemoryCartService, ServiceError};
use food_cart_sync::storage::MemoryStore;
use food_cart_sync::{CartStore, CartSyncConfig};
use parking_lot::Mutex;

// =============================================================================
// Mock Cart Service
// =============================================================================

/// Cart Service call kinds, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    Add,
    Update,
    Remove,
    Clear,
    BatchUpdate,
    Validate,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// Idempotency key, for mutating calls.
    pub request_id: Option<OperationId>,
    /// Whether the call was answered with an injected failure.
    pub failed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Times(u32),
}

#[derive(Debug, Default)]
struct Control {
    failures: HashMap<CallKind, Failure>,
    calls: Vec<RecordedCall>,
    validation_issues: Vec<String>,
    latency: Duration,
}

/// Scriptable Cart Service.
///
/// Holds real server-side lines (via [`MemoryCartService`]) and fails chosen
/// call kinds on demand.
#[derive(Debug, Default)]
pub struct MockCartService {
    server: MemoryCartService,
    control: Mutex<Control>,
}

impl MockCartService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service whose server-side cart already holds `items`.
    #[must_use]
    pub fn with_items(items: Vec<CartItem>) -> Self {
        Self {
            server: MemoryCartService::with_items(items),
            control: Mutex::default(),
        }
    }

    /// Register the server's catalog, used by `validate`.
    #[must_use]
    pub fn with_catalog(self, products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            server: self.server.with_catalog(products),
            control: self.control,
        }
    }

    /// Fail every call of `kind` until [`Self::heal`].
    pub fn fail_always(&self, kind: CallKind) {
        self.control.lock().failures.insert(kind, Failure::Always);
    }

    /// Fail the next `times` calls of `kind`.
    pub fn fail_times(&self, kind: CallKind, times: u32) {
        self.control.lock().failures.insert(kind, Failure::Times(times));
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.control.lock().failures.clear();
    }

    /// Extra issues reported by `validate`.
    pub fn set_validation_issues(&self, issues: Vec<String>) {
        self.control.lock().validation_issues = issues;
    }

    /// Delay every call by `latency`, so concurrent work can interleave.
    pub fn set_latency(&self, latency: Duration) {
        self.control.lock().latency = latency;
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.control.lock().calls.clone()
    }

    /// Number of calls of `kind` received so far.
    #[must_use]
    pub fn call_count(&self, kind: CallKind) -> usize {
        self.control
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }

    /// Server-side lines.
    #[must_use]
    pub fn server_items(&self) -> Vec<CartItem> {
        self.server.items()
    }

    /// Distinct request ids the server applied.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.server.applied_count()
    }

    fn record(&self, kind: CallKind, request_id: Option<OperationId>) -> Result<(), ServiceError> {
        let mut control = self.control.lock();
        let failed = match control.failures.get(&kind).copied() {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if n > 0 => {
                if n == 1 {
                    control.failures.remove(&kind);
                } else {
                    control.failures.insert(kind, Failure::Times(n - 1));
                }
                true
            }
            _ => false,
        };
        control.calls.push(RecordedCall {
            kind,
            request_id,
            failed,
        });
        if failed {
            return Err(ServiceError::Unavailable(format!("injected {kind:?} failure")));
        }
        Ok(())
    }

    async fn call(&self, kind: CallKind, request_id: Option<OperationId>) -> Result<(), ServiceError> {
        let latency = self.control.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.record(kind, request_id)
    }
}

#[async_trait]
impl CartService for MockCartService {
    async fn get(&self) -> Result<Vec<CartItem>, ServiceError> {
        self.call(CallKind::Get, None).await?;
        self.server.get().await
    }

    async fn add(
        &self,
        request_id: OperationId,
        product: &Product,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.call(CallKind::Add, Some(request_id)).await?;
        self.server.add(request_id, product, quantity, options).await
    }

    async fn update(
        &self,
        request_id: OperationId,
        id: &ProductId,
        quantity: u32,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.call(CallKind::Update, Some(request_id)).await?;
        self.server.update(request_id, id, quantity, options).await
    }

    async fn remove(
        &self,
        request_id: OperationId,
        id: &ProductId,
        options: &[SelectedOption],
    ) -> Result<(), ServiceError> {
        self.call(CallKind::Remove, Some(request_id)).await?;
        self.server.remove(request_id, id, options).await
    }

    async fn clear(&self, request_id: OperationId) -> Result<(), ServiceError> {
        self.call(CallKind::Clear, Some(request_id)).await?;
        self.server.clear(request_id).await
    }

    async fn batch_update(
        &self,
        request_id: OperationId,
        updates: &[ItemUpdate],
    ) -> Result<(), ServiceError> {
        self.call(CallKind::BatchUpdate, Some(request_id)).await?;
        self.server.batch_update(request_id, updates).await
    }

    async fn validate(&self, items: &[CartItem]) -> Result<Vec<String>, ServiceError> {
        self.call(CallKind::Validate, None).await?;
        let mut issues = self.server.validate(items).await?;
        issues.extend(self.control.lock().validation_issues.iter().cloned());
        Ok(issues)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Default configuration without backoff delays.
#[must_use]
pub fn test_config() -> CartSyncConfig {
    CartSyncConfig {
        retry_backoff: Duration::ZERO,
        ..CartSyncConfig::default()
    }
}

/// Cart store, its backend and its device storage.
pub struct Harness {
    pub cart: CartStore,
    pub service: Arc<MockCartService>,
    pub storage: Arc<MemoryStore>,
}

impl Harness {
    /// Fresh store over an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_service(MockCartService::new())
    }

    /// Fresh store over `service`.
    #[must_use]
    pub fn with_service(service: MockCartService) -> Self {
        Self::with_parts(Arc::new(service), Arc::new(MemoryStore::new()))
    }

    /// Store over existing parts, as after an app restart.
    #[must_use]
    pub fn with_parts(service: Arc<MockCartService>, storage: Arc<MemoryStore>) -> Self {
        let cart = CartStore::new(&test_config(), service.clone(), storage.clone());
        Self {
            cart,
            service,
            storage,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn pad_thai() -> Product {
    Product::new("pad-thai", "Pad Thai", Price::from_cents(1450), "noodles")
}

#[must_use]
pub fn green_curry() -> Product {
    Product::new("green-curry", "Green Curry", Price::from_cents(1600), "curries")
}

#[must_use]
pub fn spring_rolls() -> Product {
    Product::new("spring-rolls", "Spring Rolls", Price::from_cents(700), "starters")
}

/// Option with a one dollar surcharge.
#[must_use]
pub fn extra(name: &str) -> SelectedOption {
    SelectedOption::new(name, Price::from_cents(100))
}

/// Line of `product` with `quantity` and `options`.
#[must_use]
pub fn line(product: Product, quantity: u32, options: Vec<SelectedOption>) -> CartItem {
    CartItem::new(product, quantity, options)
}
