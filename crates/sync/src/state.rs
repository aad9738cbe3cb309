//! Cart aggregate and the values reported back to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use food_cart_core::cart::{self, CartItem};
use food_cart_core::{OperationId, OperationKind, Price, ProductId, QueuedOperation};
use tracing::debug;

use crate::queue::OperationQueue;

/// Per-line busy marker while a remote call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineActivity {
    Adding,
    Updating,
    Removing,
}

/// Aggregate root of the client-side cart.
///
/// `version` only moves forward, and only when the Cart Service confirms a
/// change or a load. Derived totals are recomputed from `items` on every read.
#[derive(Debug, Clone)]
pub struct CartState {
    /// Lines in display order.
    pub items: Vec<CartItem>,
    /// Confirmed-acknowledgement counter.
    pub version: u64,
    /// Last confirmed contact with the Cart Service.
    pub last_synced: Option<DateTime<Utc>>,
    /// Local state diverges from the last confirmed state.
    pub is_dirty: bool,
    /// Connectivity as last reported by the host.
    pub is_online: bool,
    /// Mutations waiting for the Cart Service.
    pub operation_queue: OperationQueue,
    /// Lines with a remote call in flight.
    pub loading_states: HashMap<ProductId, LineActivity>,
    /// Last surfaced failure.
    pub error: Option<String>,
    /// A queue drain is running.
    pub is_processing_queue: bool,
    /// Items came from the local backup rather than the server.
    pub provisional: bool,
    pub(crate) notices: Vec<CartNotice>,
}

impl CartState {
    /// Empty, online cart whose queue evicts after `max_retries` failed passes.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            items: Vec::new(),
            version: 0,
            last_synced: None,
            is_dirty: false,
            is_online: true,
            operation_queue: OperationQueue::new(max_retries),
            loading_states: HashMap::new(),
            error: None,
            is_processing_queue: false,
            provisional: false,
            notices: Vec::new(),
        }
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn cart_count(&self) -> u32 {
        cart::count_items(&self.items)
    }

    /// Sum of unit price times quantity.
    #[must_use]
    pub fn total_price(&self) -> Price {
        cart::total_price(&self.items)
    }

    /// Whether a new mutation may call the Cart Service directly.
    ///
    /// Anything queued, or a drain in progress, forces new mutations to queue
    /// behind it so replay order matches the order the user acted in. The
    /// store drains that backlog before the mutation returns.
    #[must_use]
    pub fn accepts_direct_calls(&self) -> bool {
        self.is_online && self.operation_queue.is_empty() && !self.is_processing_queue
    }

    /// Record a confirmed acknowledgement of a direct mutation.
    pub(crate) fn mark_synced(&mut self) {
        self.version += 1;
        self.last_synced = Some(Utc::now());
        self.is_dirty = false;
        self.error = None;
    }

    /// Record a confirmed replay of a queued operation.
    pub(crate) fn mark_replayed(&mut self) {
        self.version += 1;
        self.last_synced = Some(Utc::now());
    }

    /// Replace the items with the server's lines, rebasing queued intents on top.
    pub(crate) fn apply_server_items(&mut self, mut items: Vec<CartItem>) {
        for queued in self.operation_queue.iter() {
            if let Err(e) = cart::apply_operation(&mut items, &queued.operation) {
                debug!(operation_id = %queued.id, error = %e, "Skipped rebasing queued operation");
            }
        }
        self.items = items;
        self.version += 1;
        self.last_synced = Some(Utc::now());
        self.is_dirty = !self.operation_queue.is_empty();
        self.provisional = false;
        self.error = None;
    }

    /// Reset to an empty cart, keeping the connectivity flag.
    pub(crate) fn reset(&mut self) {
        let is_online = self.is_online;
        *self = Self::new(self.operation_queue.max_retries());
        self.is_online = is_online;
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::new(crate::queue::DEFAULT_MAX_RETRIES)
    }
}

/// User-facing event produced by a cart operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// Applied locally, will sync when the connection returns.
    QueuedOffline {
        operation_id: OperationId,
        kind: OperationKind,
    },
    /// Applied locally while online, queued behind earlier unconfirmed changes.
    QueuedBehindBacklog {
        operation_id: OperationId,
        kind: OperationKind,
    },
    /// A remote call failed after every attempt and the change was undone.
    SyncFailed { message: String },
    /// A queued change was dropped after repeated failures.
    ChangeDropped {
        operation: QueuedOperation,
        reason: String,
    },
    /// The server could not be reached; items were restored from the device.
    RestoredFromBackup { lines: usize },
}

/// How a mutation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Confirmed by the Cart Service.
    Synced,
    /// Applied locally and queued for replay.
    Queued,
}

/// Where the items came from after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Authoritative lines from the Cart Service.
    Server,
    /// Provisional lines from the local backup.
    Backup { lines: usize },
    /// Neither the server nor a backup had anything.
    Empty,
}

/// Result of one queue drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueReport {
    /// Operations confirmed and removed.
    pub applied: usize,
    /// Operations dropped after reaching the retry bound.
    pub evicted: Vec<QueuedOperation>,
    /// Operations still queued.
    pub remaining: usize,
    /// The pass did not run because another drain held the flag.
    pub skipped: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use food_cart_core::{OperationData, Product};

    use super::*;

    fn dumplings(quantity: u32) -> CartItem {
        CartItem::new(
            Product::new("dumplings", "Pork Dumplings", Price::from_cents(950), "starters"),
            quantity,
            vec![],
        )
    }

    #[test]
    fn test_derived_totals_follow_items() {
        let mut state = CartState::default();
        assert_eq!(state.cart_count(), 0);
        assert_eq!(state.total_price(), Price::ZERO);

        state.items.push(dumplings(3));
        assert_eq!(state.cart_count(), 3);
        assert_eq!(state.total_price(), Price::from_cents(2850));

        state.items.clear();
        assert_eq!(state.cart_count(), 0);
    }

    #[test]
    fn test_direct_calls_need_online_and_idle_queue() {
        let mut state = CartState::default();
        assert!(state.accepts_direct_calls());

        state.is_processing_queue = true;
        assert!(!state.accepts_direct_calls());
        state.is_processing_queue = false;

        state
            .operation_queue
            .enqueue(QueuedOperation::new(OperationData::Clear));
        assert!(!state.accepts_direct_calls());
        state.operation_queue.clear();

        state.is_online = false;
        assert!(!state.accepts_direct_calls());
    }

    #[test]
    fn test_server_items_rebase_queued_intents() {
        let mut state = CartState::default();
        state.operation_queue.enqueue(QueuedOperation::new(OperationData::Update {
            id: ProductId::new("dumplings"),
            quantity: 6,
            selected_option: vec![],
        }));
        state.operation_queue.enqueue(QueuedOperation::new(OperationData::Remove {
            id: ProductId::new("missing"),
            selected_option: vec![],
        }));

        state.apply_server_items(vec![dumplings(2)]);

        assert_eq!(state.items, vec![dumplings(6)]);
        assert_eq!(state.version, 1);
        assert!(state.is_dirty);
        assert!(state.last_synced.is_some());
    }

    #[test]
    fn test_reset_keeps_connectivity() {
        let mut state = CartState::default();
        state.items.push(dumplings(1));
        state.is_online = false;
        state.version = 4;

        state.reset();

        assert!(state.items.is_empty());
        assert_eq!(state.version, 0);
        assert!(!state.is_online);
    }
}
