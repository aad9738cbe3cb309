//! Public cart API.
//!
//! [`CartStore`] composes the mutation engine, the operation queue and the
//! backup store, and owns the connectivity, dirty and version bookkeeping.
//!
//! # Example
//!
//! ```rust,ignore
//! use food_cart_sync::{CartStore, CartSyncConfig};
//!
//! let store = CartStore::new(&CartSyncConfig::from_env()?, service, persistent);
//! store.restore_offline_queue().await;
//! store.load_cart().await;
//! store.add_item(product, 2, vec![]).await?;
//! ```

use std::sync::Arc;

use food_cart_core::cart::{self, CartItem, LineKey};
use food_cart_core::validation::{self, check_quantity};
use food_cart_core::{
    MAX_ITEM_QUANTITY, OperationData, Price, Product, ProductId, QuantityError, SelectedOption,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::CartSyncConfig;
use crate::engine::{Mutation, MutationEngine, RemoteCall, Routing, SnapshotScope};
use crate::error::{CartError, Result};
use crate::queue::FailureOutcome;
use crate::retry::RetryExecutor;
use crate::service::{CartService, ItemUpdate, ServiceError, send_operation};
use crate::state::{
    CartNotice, CartState, LineActivity, LoadOutcome, MutationOutcome, QueueReport,
};
use crate::storage::{LocalBackupStore, PersistentStore};

/// One entry of [`CartStore::update_multiple_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdate {
    /// Product id of the line.
    pub id: ProductId,
    /// Requested quantity; every entry must be within 1..=100.
    pub quantity: i64,
    /// Narrows the match to a line carrying this option.
    pub option_name: Option<String>,
}

impl QuantityUpdate {
    /// Update for the first line of a product.
    #[must_use]
    pub fn new(id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            quantity,
            option_name: None,
        }
    }

    /// Narrow the match to a line carrying `option_name`.
    #[must_use]
    pub fn with_option(mut self, option_name: impl Into<String>) -> Self {
        self.option_name = Some(option_name.into());
        self
    }
}

/// Offline-first cart.
pub struct CartStore {
    state: Mutex<CartState>,
    engine: MutationEngine,
}

impl CartStore {
    /// Create an empty, online cart.
    #[must_use]
    pub fn new(
        config: &CartSyncConfig,
        service: Arc<dyn CartService>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let backup = LocalBackupStore::new(store, config);
        Self {
            state: Mutex::new(CartState::new(config.queue_max_retries)),
            engine: MutationEngine::new(service, backup, RetryExecutor::from_config(config)),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add units of a product, merging into an existing same line.
    ///
    /// # Errors
    ///
    /// - [`CartError::InvalidQuantity`] if `quantity` or the merged quantity is
    ///   outside 1..=100
    /// - [`CartError::Remote`] if the Cart Service failed after every attempt;
    ///   the cart is rolled back
    #[instrument(skip(self, product, options), fields(product_id = %product.id))]
    pub async fn add_item(
        &self,
        product: Product,
        quantity: u32,
        options: Vec<SelectedOption>,
    ) -> Result<MutationOutcome> {
        let outcome = self.add_line(product, quantity, options, Routing::Auto).await;
        self.drain_backlog(outcome).await
    }

    async fn add_line(
        &self,
        product: Product,
        quantity: u32,
        options: Vec<SelectedOption>,
        routing: Routing,
    ) -> Result<MutationOutcome> {
        let quantity = check_quantity(i64::from(quantity))?;

        self.engine
            .execute(&self.state, routing, |state| {
                let key = LineKey::new(product.id.clone(), &options);
                let existing = cart::find_line(&state.items, &key)
                    .and_then(|i| state.items.get(i))
                    .map_or(0, |item| item.quantity);
                let merged = existing.saturating_add(quantity);
                if merged > MAX_ITEM_QUANTITY {
                    return Err(QuantityError::AboveMaximum {
                        got: i64::from(merged),
                        max: MAX_ITEM_QUANTITY,
                    }
                    .into());
                }

                Ok(Mutation::single(
                    "add_item",
                    OperationData::Add {
                        product,
                        quantity,
                        selected_option: options,
                    },
                    SnapshotScope::Lines(vec![key]),
                    LineActivity::Adding,
                ))
            })
            .await
    }

    /// Set the quantity of the first line matching `id` (and `option_name`).
    ///
    /// A quantity below one removes the line.
    ///
    /// # Errors
    ///
    /// - [`CartError::InvalidQuantity`] if `quantity` is above 100
    /// - [`CartError::ItemNotFound`] if no line matches
    /// - [`CartError::Remote`] if the Cart Service failed after every attempt
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn update_quantity(
        &self,
        id: &ProductId,
        quantity: i64,
        option_name: Option<&str>,
    ) -> Result<MutationOutcome> {
        if quantity < 1 {
            debug!("Quantity below one, removing line");
            return self.remove_item(id, option_name).await;
        }
        let quantity = check_quantity(quantity)?;

        let outcome = self
            .engine
            .execute(&self.state, Routing::Auto, |state| {
                let line = matching_line(&state.items, id, option_name)?;
                Ok(Mutation::single(
                    "update_quantity",
                    OperationData::Update {
                        id: id.clone(),
                        quantity,
                        selected_option: line.selected_option.clone(),
                    },
                    SnapshotScope::Lines(vec![line.key()]),
                    LineActivity::Updating,
                ))
            })
            .await;
        self.drain_backlog(outcome).await
    }

    /// Remove the first line matching `id` (and `option_name`).
    ///
    /// # Errors
    ///
    /// - [`CartError::ItemNotFound`] if no line matches
    /// - [`CartError::Remote`] if the Cart Service failed after every attempt
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn remove_item(&self, id: &ProductId, option_name: Option<&str>) -> Result<MutationOutcome> {
        let outcome = self
            .engine
            .execute(&self.state, Routing::Auto, |state| {
                let line = matching_line(&state.items, id, option_name)?;
                Ok(Mutation::single(
                    "remove_item",
                    OperationData::Remove {
                        id: id.clone(),
                        selected_option: line.selected_option.clone(),
                    },
                    SnapshotScope::Lines(vec![line.key()]),
                    LineActivity::Removing,
                ))
            })
            .await;
        self.drain_backlog(outcome).await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if the Cart Service failed after every
    /// attempt; the full list is restored.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<MutationOutcome> {
        let outcome = self
            .engine
            .execute(&self.state, Routing::Auto, |_| {
                Ok(Mutation::single(
                    "clear_cart",
                    OperationData::Clear,
                    SnapshotScope::All,
                    LineActivity::Removing,
                ))
            })
            .await;
        self.drain_backlog(outcome).await
    }

    /// Set several line quantities at once, all or nothing.
    ///
    /// Online, one batch call confirms every line and a failure rolls back
    /// every line. Offline, one `update` is queued per line.
    ///
    /// # Errors
    ///
    /// - [`CartError::Validation`] if `updates` is empty
    /// - [`CartError::InvalidQuantity`] if any quantity is outside 1..=100
    /// - [`CartError::ItemNotFound`] if any entry matches no line
    /// - [`CartError::Remote`] if the batch call failed after every attempt
    #[instrument(skip(self, updates), fields(lines = updates.len()))]
    pub async fn update_multiple_items(&self, updates: &[QuantityUpdate]) -> Result<MutationOutcome> {
        if updates.is_empty() {
            return Err(CartError::Validation("Batch update has no entries".to_string()));
        }
        let quantities = updates
            .iter()
            .map(|update| check_quantity(update.quantity))
            .collect::<std::result::Result<Vec<u32>, _>>()?;

        let outcome = self
            .engine
            .execute(&self.state, Routing::Auto, |state| {
                let mut keys = Vec::with_capacity(updates.len());
                let mut intents = Vec::with_capacity(updates.len());
                let mut wire = Vec::with_capacity(updates.len());

                for (update, quantity) in updates.iter().zip(quantities) {
                    let line = matching_line(&state.items, &update.id, update.option_name.as_deref())?;
                    let key = line.key();
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                    intents.push(OperationData::Update {
                        id: update.id.clone(),
                        quantity,
                        selected_option: line.selected_option.clone(),
                    });
                    wire.push(ItemUpdate {
                        id: update.id.clone(),
                        quantity,
                        selected_option: line.selected_option.clone(),
                    });
                }

                Ok(Mutation {
                    label: "update_multiple_items",
                    intents,
                    remote: RemoteCall::Batch(wire),
                    scope: SnapshotScope::Lines(keys),
                    activity: LineActivity::Updating,
                })
            })
            .await;
        self.drain_backlog(outcome).await
    }

    /// Drain the backlog a mutation was queued behind while online.
    ///
    /// Reports `Synced` when the drain confirmed every queued operation.
    async fn drain_backlog(&self, outcome: Result<MutationOutcome>) -> Result<MutationOutcome> {
        if !matches!(outcome, Ok(MutationOutcome::Queued)) {
            return outcome;
        }
        {
            let state = self.state.lock();
            if !state.is_online || state.is_processing_queue {
                return outcome;
            }
        }

        debug!("Queued behind a backlog while online, draining");
        let report = self.process_offline_queue().await;
        if report.skipped || report.remaining > 0 || !report.evicted.is_empty() {
            Ok(MutationOutcome::Queued)
        } else {
            Ok(MutationOutcome::Synced)
        }
    }

    // =========================================================================
    // Loading and Sync
    // =========================================================================

    /// Fetch the authoritative cart.
    ///
    /// Offline, or when the Cart Service fails after every attempt, the
    /// local backup is restored and marked provisional. Never fails.
    #[instrument(skip(self))]
    pub async fn load_cart(&self) -> LoadOutcome {
        if !self.is_online() {
            debug!("Offline, loading cart from backup");
            return self.restore_backup(None).await;
        }

        match self.pull_server_items("load_cart").await {
            Ok(()) => {
                self.engine.save_backup(&self.state).await;
                LoadOutcome::Server
            }
            Err(e) => self.restore_backup(Some(e.to_string())).await,
        }
    }

    /// Replace the items with the server's lines, rebasing the queue on them.
    async fn pull_server_items(&self, label: &str) -> std::result::Result<(), ServiceError> {
        let service = self.engine.service();
        let items = self.engine.retry().run(label, || service.get()).await?;

        let mut state = self.state.lock();
        state.apply_server_items(items);
        info!(
            lines = state.items.len(),
            version = state.version,
            "Cart loaded from server"
        );
        Ok(())
    }

    /// Reload from the server, then drain the queue.
    ///
    /// The cart is clean afterwards only if the queue drained completely.
    ///
    /// # Errors
    ///
    /// - [`CartError::Offline`] if the cart is offline
    /// - [`CartError::Remote`] if the reload failed after every attempt
    #[instrument(skip(self))]
    pub async fn sync_with_server(&self) -> Result<QueueReport> {
        if !self.is_online() {
            return Err(CartError::Offline);
        }

        if let Err(e) = self.pull_server_items("sync_with_server").await {
            self.state.lock().error = Some(e.to_string());
            return Err(e.into());
        }
        self.engine.save_backup(&self.state).await;

        let report = self.process_offline_queue().await;
        {
            let mut state = self.state.lock();
            if state.operation_queue.is_empty() && report.evicted.is_empty() {
                state.is_dirty = false;
            }
        }
        info!(
            applied = report.applied,
            remaining = report.remaining,
            "Cart synced with server"
        );
        Ok(report)
    }

    /// Replay queued operations in order.
    ///
    /// A pass stops at the first operation that fails and is kept, so later
    /// operations never overtake it. Operations reaching the retry bound are
    /// evicted and reported once. Does nothing if another drain is running.
    #[instrument(skip(self))]
    pub async fn process_offline_queue(&self) -> QueueReport {
        {
            let mut state = self.state.lock();
            if state.is_processing_queue {
                debug!("Queue drain already running");
                return QueueReport {
                    skipped: true,
                    remaining: state.operation_queue.len(),
                    ..QueueReport::default()
                };
            }
            if !state.is_online || state.operation_queue.is_empty() {
                return QueueReport {
                    remaining: state.operation_queue.len(),
                    ..QueueReport::default()
                };
            }
            state.is_processing_queue = true;
        }

        let mut report = QueueReport::default();
        let service = self.engine.service();

        loop {
            let next = {
                let state = self.state.lock();
                if state.is_online {
                    state.operation_queue.front().cloned()
                } else {
                    debug!("Went offline during drain");
                    None
                }
            };
            let Some(op) = next else { break };

            let result = self
                .engine
                .retry()
                .run("replay_operation", || send_operation(service, op.id, &op.operation))
                .await;

            let stop = {
                let mut state = self.state.lock();
                match result {
                    Ok(()) => {
                        state.operation_queue.complete(op.id);
                        state.mark_replayed();
                        report.applied += 1;
                        debug!(operation_id = %op.id, kind = %op.kind(), "Replayed queued operation");
                        false
                    }
                    Err(e) => match state.operation_queue.record_failure(op.id) {
                        Some(FailureOutcome::Evicted(evicted)) => {
                            warn!(
                                operation_id = %evicted.id,
                                kind = %evicted.kind(),
                                retries = evicted.retries,
                                error = %e,
                                "Dropped queued operation after repeated failures"
                            );
                            state.notices.push(CartNotice::ChangeDropped {
                                operation: evicted.clone(),
                                reason: e.to_string(),
                            });
                            report.evicted.push(evicted);
                            false
                        }
                        Some(FailureOutcome::Retained { retries }) => {
                            debug!(operation_id = %op.id, retries, error = %e, "Queued operation kept for next drain");
                            state.error = Some(e.to_string());
                            true
                        }
                        None => false,
                    },
                }
            };
            self.engine.save_queue(&self.state).await;

            if stop {
                break;
            }
        }

        {
            let mut state = self.state.lock();
            state.is_processing_queue = false;
            report.remaining = state.operation_queue.len();
            if report.remaining == 0 && report.evicted.is_empty() {
                state.is_dirty = false;
                state.error = None;
            }
        }
        self.engine.save_backup(&self.state).await;

        info!(
            applied = report.applied,
            evicted = report.evicted.len(),
            remaining = report.remaining,
            "Offline queue processed"
        );
        report
    }

    /// Record a connectivity change.
    ///
    /// Returns `true` on an offline to online transition, when the caller
    /// should schedule [`Self::process_offline_queue`].
    pub fn set_online_status(&self, online: bool) -> bool {
        let mut state = self.state.lock();
        let reconnected = online && !state.is_online;
        if state.is_online != online {
            info!(online, queued = state.operation_queue.len(), "Connectivity changed");
        }
        state.is_online = online;
        reconnected
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Local validation plus server validation when online.
    ///
    /// Returns the union of issues; an empty list means the cart is valid. A
    /// failing server validation keeps the local issues.
    #[instrument(skip(self))]
    pub async fn validate_cart(&self) -> Vec<String> {
        let (items, issues) = {
            let state = self.state.lock();
            (state.items.clone(), validation::validate_items(&state.items))
        };
        self.with_server_issues(items, issues).await
    }

    /// [`Self::validate_cart`] with the pre-checkout rules (an empty cart is an issue).
    #[instrument(skip(self))]
    pub async fn validate_for_checkout(&self) -> Vec<String> {
        let (items, issues) = {
            let state = self.state.lock();
            (state.items.clone(), validation::checkout_issues(&state.items))
        };
        if items.is_empty() {
            return issues;
        }
        self.with_server_issues(items, issues).await
    }

    async fn with_server_issues(&self, items: Vec<CartItem>, mut issues: Vec<String>) -> Vec<String> {
        if !self.is_online() {
            return issues;
        }
        let service = self.engine.service();
        match self
            .engine
            .retry()
            .run("validate_cart", || service.validate(&items))
            .await
        {
            Ok(remote) => {
                for issue in remote {
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Server validation unavailable, using local checks"),
        }
        issues
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Load the account cart and merge the guest cart into it.
    ///
    /// The guest lines are replayed as adds before the guest backup is
    /// replaced by the merged cart. A line the Cart Service does not confirm
    /// is queued rather than dropped, and when the account cart cannot be
    /// loaded every guest line is queued. Lines failing local validation are
    /// logged and skipped.
    #[instrument(skip(self))]
    pub async fn on_login(&self) -> LoadOutcome {
        let guest = self.engine.backup().restore().await;
        self.state.lock().items.clear();

        let loaded = if self.is_online() {
            match self.pull_server_items("on_login").await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Account cart unavailable, queueing guest cart");
                    self.state.lock().error = Some(e.to_string());
                    false
                }
            }
        } else {
            false
        };

        let guest_lines = guest.len();
        let routing = if loaded { Routing::Auto } else { Routing::Queue };
        for item in guest {
            self.merge_guest_line(item, routing).await;
        }
        self.engine.save_backup(&self.state).await;
        if guest_lines > 0 {
            info!(lines = guest_lines, "Merged guest cart");
        }

        if loaded {
            return LoadOutcome::Server;
        }
        let mut state = self.state.lock();
        if state.items.is_empty() {
            return LoadOutcome::Empty;
        }
        let lines = state.items.len();
        state.provisional = true;
        if state.error.is_some() {
            state.notices.push(CartNotice::RestoredFromBackup { lines });
        }
        LoadOutcome::Backup { lines }
    }

    async fn merge_guest_line(&self, item: CartItem, routing: Routing) {
        let CartItem {
            product,
            quantity,
            selected_option,
        } = item;
        let id = product.id.clone();

        let result = match self
            .add_line(product.clone(), quantity, selected_option.clone(), routing)
            .await
        {
            Err(CartError::Remote(e)) => {
                debug!(product_id = %id, error = %e, "Guest line not confirmed, queueing");
                self.add_line(product, quantity, selected_option, Routing::Queue)
                    .await
            }
            other => other,
        };
        if let Err(e) = result {
            warn!(product_id = %id, error = %e, "Could not merge guest cart line");
        }
    }

    /// Reset to an empty cart and forget the backup and queue.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Storage`] if a persisted slot cannot be removed.
    #[instrument(skip(self))]
    pub async fn on_logout(&self) -> Result<()> {
        self.state.lock().reset();
        self.engine.backup().clear().await?;
        self.engine.backup().clear_queue().await?;
        info!("Cart reset on logout");
        Ok(())
    }

    /// Reload a queue persisted by an earlier session.
    ///
    /// Returns the number of operations restored.
    #[instrument(skip(self))]
    pub async fn restore_offline_queue(&self) -> usize {
        let persisted = self.engine.backup().restore_queue().await;
        let mut state = self.state.lock();
        let added = state.operation_queue.extend_restored(persisted);
        if added > 0 {
            state.is_dirty = true;
            info!(operations = added, "Restored offline queue");
        }
        added
    }

    /// Drain the notices produced since the last call.
    pub fn take_notices(&self) -> Vec<CartNotice> {
        std::mem::take(&mut self.state.lock().notices)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.state.lock().clone()
    }

    /// Current lines.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.state.lock().items.clone()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn cart_count(&self) -> u32 {
        self.state.lock().cart_count()
    }

    /// Sum of unit price times quantity.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.state.lock().total_price()
    }

    /// Whether a remote call for the product is in flight.
    #[must_use]
    pub fn is_line_busy(&self, id: &ProductId) -> bool {
        self.state.lock().loading_states.contains_key(id)
    }

    /// Connectivity as last reported.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state.lock().is_online
    }

    /// Number of queued operations.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.lock().operation_queue.len()
    }

    async fn restore_backup(&self, error: Option<String>) -> LoadOutcome {
        let items = self.engine.backup().restore().await;
        let mut state = self.state.lock();
        state.error.clone_from(&error);

        if items.is_empty() {
            if let Some(message) = &error {
                warn!(error = %message, "Cart load failed and no backup exists");
            }
            state.items.clear();
            state.provisional = false;
            return LoadOutcome::Empty;
        }

        let lines = items.len();
        state.items = items;
        state.provisional = true;
        state.is_dirty = true;
        if let Some(message) = &error {
            warn!(error = %message, lines, "Cart load failed, restored backup");
            state.notices.push(CartNotice::RestoredFromBackup { lines });
        }
        LoadOutcome::Backup { lines }
    }
}

fn matching_line<'a>(
    items: &'a [CartItem],
    id: &ProductId,
    option_name: Option<&str>,
) -> Result<&'a CartItem> {
    cart::find_matching(items, id, option_name)
        .and_then(|i| items.get(i))
        .ok_or_else(|| CartError::ItemNotFound(id.clone()))
}
