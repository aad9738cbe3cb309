//! Process-wide cart handle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::CartSyncConfig;
use crate::service::CartService;
use crate::state::QueueReport;
use crate::storage::PersistentStore;
use crate::store::CartStore;

/// Shared handle to the single [`CartStore`] of a session.
///
/// Cheaply cloneable via `Arc`. Built once at startup and passed to whatever
/// needs the cart; there is no global instance.
#[derive(Clone)]
pub struct CartContext {
    inner: Arc<CartStore>,
}

impl CartContext {
    /// Build the store over the given service and persistent store.
    #[must_use]
    pub fn new(
        config: &CartSyncConfig,
        service: Arc<dyn CartService>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        Self {
            inner: Arc::new(CartStore::new(config, service, store)),
        }
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn store(&self) -> &CartStore {
        &self.inner
    }

    /// Record a connectivity change, draining the queue on reconnect.
    ///
    /// Returns the handle of the spawned drain when one was scheduled. Must be
    /// called from within a Tokio runtime.
    pub fn set_online_status(&self, online: bool) -> Option<JoinHandle<QueueReport>> {
        if !self.inner.set_online_status(online) {
            return None;
        }
        debug!("Reconnected, scheduling queue drain");
        let store = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            store.process_offline_queue().await
        }))
    }
}
