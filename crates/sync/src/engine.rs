//! Optimistic mutation protocol.
//!
//! Every mutation runs the same steps:
//!
//! 1. Under the state lock: snapshot the affected lines, apply the intents to
//!    the in-memory items, mark the cart dirty and pick a route.
//! 2. Direct route: call the Cart Service through the [`RetryExecutor`]. The
//!    lock is not held during the call.
//! 3. Under the lock again: on success advance the version, on exhausted
//!    failure restore the snapshot and surface the error.
//! 4. Persist the items (and the queue when it changed) to the backup store.
//!
//! Queued route: the intents are appended to the operation queue and the
//! optimistic state is kept. No network call is made.
//!
//! Writes to the backup store are serialized and always read the state after
//! taking the write lock, so a slow write never overwrites a newer one.

use std::sync::Arc;

use food_cart_core::cart::{self, CartItem, LineKey};
use food_cart_core::{OperationData, OperationId, ProductId, QueuedOperation};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::retry::RetryExecutor;
use crate::service::{CartService, ItemUpdate, send_operation};
use crate::state::{CartNotice, CartState, LineActivity, MutationOutcome};
use crate::storage::LocalBackupStore;

/// Which part of the items a mutation may change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SnapshotScope {
    /// Only the listed lines.
    Lines(Vec<LineKey>),
    /// The whole list.
    All,
}

/// Remote call that confirms a mutation.
#[derive(Debug, Clone)]
pub(crate) enum RemoteCall {
    Operation(OperationData),
    Batch(Vec<ItemUpdate>),
}

/// A mutation ready to be applied.
#[derive(Debug, Clone)]
pub(crate) struct Mutation {
    pub label: &'static str,
    /// Intents applied locally, and queued one by one on the queued route.
    pub intents: Vec<OperationData>,
    pub remote: RemoteCall,
    pub scope: SnapshotScope,
    pub activity: LineActivity,
}

impl Mutation {
    /// Mutation confirmed by replaying its single intent remotely.
    pub fn single(
        label: &'static str,
        intent: OperationData,
        scope: SnapshotScope,
        activity: LineActivity,
    ) -> Self {
        Self {
            label,
            remote: RemoteCall::Operation(intent.clone()),
            intents: vec![intent],
            scope,
            activity,
        }
    }

    fn touched(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self
            .intents
            .iter()
            .filter_map(OperationData::product_id)
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LineSnapshot {
    key: LineKey,
    index: usize,
    item: Option<CartItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SnapshotData {
    Lines(Vec<LineSnapshot>),
    All(Vec<CartItem>),
}

/// Pre-mutation copy of the affected slice of the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MutationSnapshot {
    data: SnapshotData,
    was_dirty: bool,
}

impl MutationSnapshot {
    pub fn capture(state: &CartState, scope: &SnapshotScope) -> Self {
        let data = match scope {
            SnapshotScope::All => SnapshotData::All(state.items.clone()),
            SnapshotScope::Lines(keys) => SnapshotData::Lines(
                keys.iter()
                    .map(|key| {
                        let index = cart::find_line(&state.items, key);
                        LineSnapshot {
                            key: key.clone(),
                            index: index.unwrap_or(state.items.len()),
                            item: index.and_then(|i| state.items.get(i).cloned()),
                        }
                    })
                    .collect(),
            ),
        };
        Self {
            data,
            was_dirty: state.is_dirty,
        }
    }

    /// Put the captured lines back, leaving lines outside the scope untouched.
    pub fn restore(self, state: &mut CartState) {
        match self.data {
            SnapshotData::All(items) => state.items = items,
            SnapshotData::Lines(lines) => {
                for line in &lines {
                    if let Some(index) = cart::find_line(&state.items, &line.key) {
                        state.items.remove(index);
                    }
                }
                let mut prior: Vec<(usize, CartItem)> = lines
                    .into_iter()
                    .filter_map(|line| line.item.map(|item| (line.index, item)))
                    .collect();
                prior.sort_by_key(|(index, _)| *index);
                for (index, item) in prior {
                    let at = index.min(state.items.len());
                    state.items.insert(at, item);
                }
            }
        }
        state.is_dirty = self.was_dirty;
    }
}

/// How a mutation reaches the Cart Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routing {
    /// Call the service when the cart accepts direct calls, queue otherwise.
    Auto,
    /// Always queue, even when online.
    Queue,
}

enum Route {
    Direct,
    Queued,
}

/// Applies mutations optimistically and confirms or queues them.
pub(crate) struct MutationEngine {
    service: Arc<dyn CartService>,
    backup: LocalBackupStore,
    retry: RetryExecutor,
    write_lock: AsyncMutex<()>,
}

impl MutationEngine {
    pub fn new(service: Arc<dyn CartService>, backup: LocalBackupStore, retry: RetryExecutor) -> Self {
        Self {
            service,
            backup,
            retry,
            write_lock: AsyncMutex::new(()),
        }
    }

    pub fn service(&self) -> &dyn CartService {
        self.service.as_ref()
    }

    pub const fn backup(&self) -> &LocalBackupStore {
        &self.backup
    }

    pub const fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Run one mutation.
    ///
    /// `prepare` runs under the state lock and may reject the request before
    /// anything changes.
    pub async fn execute<F>(
        &self,
        state: &Mutex<CartState>,
        routing: Routing,
        prepare: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce(&CartState) -> Result<Mutation>,
    {
        let (mutation, snapshot, route, queue_len) = {
            let mut state = state.lock();
            let mutation = prepare(&state)?;
            let snapshot = MutationSnapshot::capture(&state, &mutation.scope);

            let mut items = state.items.clone();
            for intent in &mutation.intents {
                cart::apply_operation(&mut items, intent)?;
            }
            state.items = items;
            state.is_dirty = true;

            let route = if routing == Routing::Auto && state.accepts_direct_calls() {
                for id in mutation.touched() {
                    state.loading_states.insert(id, mutation.activity);
                }
                Route::Direct
            } else {
                let queued: Vec<QueuedOperation> = mutation
                    .intents
                    .iter()
                    .cloned()
                    .map(QueuedOperation::new)
                    .collect();
                let online = state.is_online;
                for op in queued {
                    let (operation_id, kind) = (op.id, op.kind());
                    state.operation_queue.enqueue(op);
                    state.notices.push(if online {
                        CartNotice::QueuedBehindBacklog { operation_id, kind }
                    } else {
                        CartNotice::QueuedOffline { operation_id, kind }
                    });
                }
                Route::Queued
            };
            (mutation, snapshot, route, state.operation_queue.len())
        };

        match route {
            Route::Queued => {
                debug!(
                    operation = mutation.label,
                    queue_len,
                    "Applied locally, queued for sync"
                );
                self.save_queue(state).await;
                self.save_backup(state).await;
                Ok(MutationOutcome::Queued)
            }
            Route::Direct => self.confirm(state, mutation, snapshot).await,
        }
    }

    async fn confirm(
        &self,
        state: &Mutex<CartState>,
        mutation: Mutation,
        snapshot: MutationSnapshot,
    ) -> Result<MutationOutcome> {
        let request_id = OperationId::generate();
        let service = self.service();
        let result = match &mutation.remote {
            RemoteCall::Operation(operation) => {
                self.retry
                    .run(mutation.label, || send_operation(service, request_id, operation))
                    .await
            }
            RemoteCall::Batch(updates) => {
                self.retry
                    .run(mutation.label, || service.batch_update(request_id, updates))
                    .await
            }
        };

        let confirmed = {
            let mut state = state.lock();
            for id in mutation.touched() {
                state.loading_states.remove(&id);
            }
            match result {
                Ok(()) => {
                    state.mark_synced();
                    info!(
                        operation = mutation.label,
                        %request_id,
                        version = state.version,
                        "Cart change confirmed"
                    );
                    Ok(())
                }
                Err(e) => {
                    snapshot.restore(&mut state);
                    let message = e.to_string();
                    warn!(
                        operation = mutation.label,
                        %request_id,
                        error = %message,
                        "Rolled back cart change"
                    );
                    state.error = Some(message.clone());
                    state.notices.push(CartNotice::SyncFailed { message });
                    Err(e)
                }
            }
        };

        confirmed?;
        self.save_backup(state).await;
        Ok(MutationOutcome::Synced)
    }

    /// Persist the current items; failures are logged, never surfaced.
    pub async fn save_backup(&self, state: &Mutex<CartState>) {
        let _write = self.write_lock.lock().await;
        let items = state.lock().items.clone();
        if let Err(e) = self.backup.save(&items).await {
            error!(error = %e, "Failed to save cart backup");
        }
    }

    /// Persist the current queue; failures are logged, never surfaced.
    pub async fn save_queue(&self, state: &Mutex<CartState>) {
        let _write = self.write_lock.lock().await;
        let queue = state.lock().operation_queue.to_vec();
        if let Err(e) = self.backup.save_queue(&queue).await {
            error!(error = %e, "Failed to save offline queue");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use food_cart_core::{Price, Product, SelectedOption};

    use super::*;
    use crate::config::CartSyncConfig;
    use crate::service::MemoryCartService;
    use crate::storage::MemoryStore;

    fn line(id: &str, quantity: u32) -> CartItem {
        CartItem::new(
            Product::new(id, id.to_uppercase(), Price::from_cents(500), "mains"),
            quantity,
            vec![],
        )
    }

    fn state_with(items: Vec<CartItem>) -> CartState {
        let mut state = CartState::default();
        state.items = items;
        state
    }

    fn key(id: &str) -> LineKey {
        LineKey::new(ProductId::new(id), &[])
    }

    #[test]
    fn test_restore_reverts_quantity_change() {
        let mut state = state_with(vec![line("a", 3), line("b", 1)]);
        let snapshot = MutationSnapshot::capture(&state, &SnapshotScope::Lines(vec![key("a")]));

        state.items[0].quantity = 5;
        state.is_dirty = true;
        snapshot.restore(&mut state);

        assert_eq!(state.items, vec![line("a", 3), line("b", 1)]);
        assert!(!state.is_dirty);
    }

    #[test]
    fn test_restore_removes_added_line() {
        let mut state = state_with(vec![line("a", 1)]);
        let snapshot = MutationSnapshot::capture(&state, &SnapshotScope::Lines(vec![key("c")]));

        state.items.push(line("c", 2));
        snapshot.restore(&mut state);

        assert_eq!(state.items, vec![line("a", 1)]);
    }

    #[test]
    fn test_restore_reinserts_removed_line_in_place() {
        let mut state = state_with(vec![line("a", 1), line("b", 2), line("c", 3)]);
        let snapshot = MutationSnapshot::capture(&state, &SnapshotScope::Lines(vec![key("b")]));

        state.items.remove(1);
        snapshot.restore(&mut state);

        assert_eq!(state.items, vec![line("a", 1), line("b", 2), line("c", 3)]);
    }

    #[test]
    fn test_restore_leaves_other_lines_alone() {
        let mut state = state_with(vec![line("a", 1)]);
        let snapshot = MutationSnapshot::capture(&state, &SnapshotScope::Lines(vec![key("a")]));

        // Another line is added while the call is in flight
        state.items[0].quantity = 4;
        state.items.push(line("d", 1));
        snapshot.restore(&mut state);

        assert_eq!(state.items, vec![line("a", 1), line("d", 1)]);
    }

    #[test]
    fn test_restore_whole_list() {
        let before = vec![line("a", 1), line("b", 2)];
        let mut state = state_with(before.clone());
        let snapshot = MutationSnapshot::capture(&state, &SnapshotScope::All);

        state.items.clear();
        snapshot.restore(&mut state);

        assert_eq!(state.items, before);
    }

    #[test]
    fn test_touched_ids_deduplicated() {
        let intent = |id: &str| OperationData::Update {
            id: ProductId::new(id),
            quantity: 2,
            selected_option: vec![SelectedOption::new("large", Price::ZERO)],
        };
        let mutation = Mutation {
            label: "update_multiple_items",
            intents: vec![intent("b"), intent("a"), intent("b")],
            remote: RemoteCall::Batch(vec![]),
            scope: SnapshotScope::All,
            activity: LineActivity::Updating,
        };
        assert_eq!(
            mutation.touched(),
            vec![ProductId::new("a"), ProductId::new("b")]
        );
    }

    #[tokio::test]
    async fn test_backup_write_waiting_on_another_saves_latest_items() {
        let backup = LocalBackupStore::new(Arc::new(MemoryStore::new()), &CartSyncConfig::default());
        let engine = Arc::new(MutationEngine::new(
            Arc::new(MemoryCartService::new()),
            backup,
            RetryExecutor::new(1, Duration::ZERO),
        ));
        let state = Arc::new(Mutex::new(state_with(vec![line("a", 1)])));

        let held = engine.write_lock.lock().await;
        let pending = tokio::spawn({
            let engine = Arc::clone(&engine);
            let state = Arc::clone(&state);
            async move { engine.save_backup(&state).await }
        });
        tokio::task::yield_now().await;

        // Changed after the write was requested but before it ran
        state.lock().items.push(line("b", 2));
        drop(held);
        pending.await.unwrap();

        assert_eq!(
            engine.backup().restore().await,
            vec![line("a", 1), line("b", 2)]
        );
    }
}
