//! Local key/value persistence.
//!
//! The cart keeps two blobs in the [`PersistentStore`]: the last item list
//! (crash-recovery backup) and the offline operation queue. Both are written
//! through [`LocalBackupStore`].

mod backup;
mod file;

pub use backup::{BackupSnapshot, LocalBackupStore};
pub use file::FileStore;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors from the persistent store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Slot name is not usable by the backend.
    #[error("Invalid slot name: {0}")]
    InvalidSlot(String),
}

/// Key/value blob storage owned by the client.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Persist `value` under `slot`, replacing any previous value.
    async fn save(&self, slot: &str, value: &str) -> Result<(), StorageError>;

    /// Read the value under `slot`, if any.
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Delete `slot`. Removing a missing slot is not an error.
    async fn remove(&self, slot: &str) -> Result<(), StorageError>;
}

/// Persistent store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of a slot, for inspection.
    #[must_use]
    pub fn get(&self, slot: &str) -> Option<String> {
        self.slots.lock().get(slot).cloned()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn save(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        self.slots.lock().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(slot))
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        self.slots.lock().remove(slot);
        Ok(())
    }
}
