//! Crash-recovery backup of the cart.
//!
//! Items are written under a fixed slot after every confirmed or queued
//! mutation. A missing or unreadable snapshot restores as an empty cart; the
//! backup is a fallback and must never block loading.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use food_cart_core::{CartItem, QueuedOperation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{PersistentStore, StorageError};
use crate::config::CartSyncConfig;

/// Serialized form of the item backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    /// Items at the time of the save.
    pub items: Vec<CartItem>,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

/// Saves and restores cart items and the offline queue.
#[derive(Clone)]
pub struct LocalBackupStore {
    store: Arc<dyn PersistentStore>,
    items_slot: String,
    queue_slot: String,
}

impl LocalBackupStore {
    /// Create a backup store over `store` using the configured slots.
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>, config: &CartSyncConfig) -> Self {
        Self {
            store,
            items_slot: config.backup_slot.clone(),
            queue_slot: config.queue_slot.clone(),
        }
    }

    /// Overwrite the item snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying store fails.
    pub async fn save(&self, items: &[CartItem]) -> Result<(), StorageError> {
        let snapshot = BackupSnapshot {
            items: items.to_vec(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot)?;
        self.store.save(&self.items_slot, &json).await?;
        debug!(lines = items.len(), "Cart backup saved");
        Ok(())
    }

    /// Last saved snapshot, or `None` if absent or unreadable.
    pub async fn restore_snapshot(&self) -> Option<BackupSnapshot> {
        let raw = match self.store.load(&self.items_slot).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read cart backup");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt cart backup");
                None
            }
        }
    }

    /// Last saved items, or an empty list if none or corrupt.
    pub async fn restore(&self) -> Vec<CartItem> {
        self.restore_snapshot()
            .await
            .map(|snapshot| snapshot.items)
            .unwrap_or_default()
    }

    /// Remove the item snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.items_slot).await
    }

    /// Persist the offline queue. An empty queue removes the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying store fails.
    pub async fn save_queue(&self, operations: &[QueuedOperation]) -> Result<(), StorageError> {
        if operations.is_empty() {
            return self.clear_queue().await;
        }
        let json = serde_json::to_string(operations)?;
        self.store.save(&self.queue_slot, &json).await
    }

    /// Persisted offline queue, or an empty list if none or corrupt.
    pub async fn restore_queue(&self) -> Vec<QueuedOperation> {
        match self.store.load(&self.queue_slot).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding corrupt offline queue");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read offline queue");
                Vec::new()
            }
        }
    }

    /// Remove the persisted offline queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn clear_queue(&self) -> Result<(), StorageError> {
        self.store.remove(&self.queue_slot).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use food_cart_core::{OperationData, Price, Product};

    use super::*;
    use crate::storage::MemoryStore;

    fn backup() -> (Arc<MemoryStore>, LocalBackupStore) {
        let memory = Arc::new(MemoryStore::new());
        let backup = LocalBackupStore::new(memory.clone(), &CartSyncConfig::default());
        (memory, backup)
    }

    fn laksa() -> CartItem {
        CartItem::new(
            Product::new("laksa", "Curry Laksa", Price::from_cents(1600), "soups"),
            2,
            vec![],
        )
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_is_empty() {
        let (_, backup) = backup();
        assert!(backup.restore().await.is_empty());
        assert!(backup.restore_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let (_, backup) = backup();
        backup.save(&[laksa()]).await.unwrap();
        backup.save(&[]).await.unwrap();
        assert!(backup.restore().await.is_empty());

        backup.save(&[laksa()]).await.unwrap();
        assert_eq!(backup.restore().await, vec![laksa()]);

        backup.clear().await.unwrap();
        assert!(backup.restore().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_restores_empty() {
        let (memory, backup) = backup();
        memory.save("cart_backup", "{not json").await.unwrap();
        assert!(backup.restore().await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_round_trip_and_empty_removes_slot() {
        let (memory, backup) = backup();
        let op = QueuedOperation::new(OperationData::Clear);

        backup.save_queue(std::slice::from_ref(&op)).await.unwrap();
        assert_eq!(backup.restore_queue().await, vec![op]);

        backup.save_queue(&[]).await.unwrap();
        assert!(memory.get("cart_offline_queue").is_none());
        assert!(backup.restore_queue().await.is_empty());
    }
}
