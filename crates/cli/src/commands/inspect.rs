//! Print what a device has persisted for the cart.

use std::path::Path;
use std::sync::Arc;

use food_cart_core::cart;
use food_cart_sync::CartSyncConfig;
use food_cart_sync::storage::{FileStore, LocalBackupStore};
use tracing::info;

use super::{CommandError, print_lines, print_queue};

/// Load the backup and queue slots from `dir` and print them.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
#[allow(clippy::print_stdout)]
pub async fn run(dir: &Path) -> Result<(), CommandError> {
    let config = CartSyncConfig::from_env()?;
    let backup = LocalBackupStore::new(Arc::new(FileStore::new(dir)), &config);

    info!(dir = %dir.display(), "Inspecting persisted cart");

    let snapshot = backup.restore_snapshot().await;
    let queue = backup.restore_queue().await;

    match &snapshot {
        Some(snapshot) => {
            println!("Backup ({}):", snapshot.saved_at.to_rfc3339());
            print_lines(&snapshot.items);
            println!(
                "  count={} total={}",
                cart::count_items(&snapshot.items),
                cart::total_price(&snapshot.items)
            );
        }
        None => println!("Backup: none"),
    }

    println!("Offline queue ({} operations):", queue.len());
    print_queue(&queue);

    Ok(())
}
