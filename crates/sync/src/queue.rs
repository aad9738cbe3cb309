//! FIFO queue of mutations waiting for the Cart Service.
//!
//! Ordering is load-bearing: replaying an `add` before a later `remove` of
//! the same line must land on the same end state as if the user had been
//! online throughout. The queue only stores and counts; draining is driven by
//! [`crate::store::CartStore::process_offline_queue`].

use std::collections::VecDeque;

use food_cart_core::{OperationId, QueuedOperation};

/// Failed drain passes after which an operation is evicted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What happened to an operation after a failed drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Kept in place for the next drain pass.
    Retained {
        /// Failed passes so far.
        retries: u32,
    },
    /// Removed from the queue after reaching the retry bound.
    Evicted(QueuedOperation),
}

/// Ordered backlog of deferred remote mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationQueue {
    operations: VecDeque<QueuedOperation>,
    max_retries: u32,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl OperationQueue {
    /// Create an empty queue evicting after `max_retries` failed passes.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            operations: VecDeque::new(),
            max_retries: max_retries.max(1),
        }
    }

    /// Append an operation to the back of the queue.
    pub fn enqueue(&mut self, operation: QueuedOperation) -> OperationId {
        let id = operation.id;
        self.operations.push_back(operation);
        id
    }

    /// Append previously persisted operations, skipping ids already queued.
    pub fn extend_restored(&mut self, operations: impl IntoIterator<Item = QueuedOperation>) -> usize {
        let mut added = 0;
        for operation in operations {
            if !self.contains(operation.id) {
                self.operations.push_back(operation);
                added += 1;
            }
        }
        added
    }

    /// Oldest operation.
    #[must_use]
    pub fn front(&self) -> Option<&QueuedOperation> {
        self.operations.front()
    }

    /// Whether an operation with `id` is queued.
    #[must_use]
    pub fn contains(&self, id: OperationId) -> bool {
        self.operations.iter().any(|op| op.id == id)
    }

    /// Remove an applied operation.
    pub fn complete(&mut self, id: OperationId) -> Option<QueuedOperation> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        self.operations.remove(index)
    }

    /// Count a failed drain attempt, evicting once the bound is reached.
    ///
    /// Returns `None` if `id` is not queued.
    pub fn record_failure(&mut self, id: OperationId) -> Option<FailureOutcome> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        let operation = self.operations.get_mut(index)?;
        operation.retries += 1;

        if operation.retries >= self.max_retries {
            return self.operations.remove(index).map(FailureOutcome::Evicted);
        }
        Some(FailureOutcome::Retained {
            retries: operation.retries,
        })
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queued operations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedOperation> {
        self.operations.iter()
    }

    /// Copy of the queued operations, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<QueuedOperation> {
        self.operations.iter().cloned().collect()
    }

    /// Drop every queued operation.
    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Failed passes after which an operation is evicted.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
