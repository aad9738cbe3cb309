//! Offline edit and reconnect scenario.
//!
//! Edits the cart while offline, reconnects, lets the context drain the
//! queue and checks that the server ended up with the same lines.

use std::path::Path;
use std::sync::Arc;

use food_cart_core::{Price, Product, ProductId, SelectedOption};
use food_cart_sync::service::MemoryCartService;
use food_cart_sync::storage::FileStore;
use food_cart_sync::{CartContext, CartSyncConfig};
use tracing::info;

use super::{CommandError, print_lines, print_queue};

/// Run the scenario, persisting into `dir`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a cart operation fails
/// or the local cart diverges from the server after the drain.
#[allow(clippy::print_stdout)]
pub async fn run(dir: &Path) -> Result<(), CommandError> {
    let config = CartSyncConfig::from_env()?;
    let service = Arc::new(MemoryCartService::new());
    let context = CartContext::new(&config, service.clone(), Arc::new(FileStore::new(dir)));
    let cart = context.store();

    cart.load_cart().await;

    let ramen = Product::new("tonkotsu", "Tonkotsu Ramen", Price::from_cents(1850), "noodles");
    let gyoza = Product::new("gyoza", "Pan-fried Gyoza", Price::from_cents(800), "starters");
    let egg = SelectedOption::new("ajitama", Price::from_cents(250));

    info!("Going offline");
    context.set_online_status(false);

    cart.add_item(ramen, 2, vec![egg]).await?;
    cart.add_item(gyoza.clone(), 1, vec![]).await?;
    cart.update_quantity(&ProductId::new("tonkotsu"), 5, Some("ajitama"))
        .await?;
    cart.add_item(gyoza, 1, vec![]).await?;
    cart.remove_item(&ProductId::new("gyoza"), None).await?;

    let offline = cart.snapshot();
    println!("Offline cart:");
    print_lines(&offline.items);
    println!("Queued:");
    print_queue(&offline.operation_queue.to_vec());

    info!("Back online");
    if let Some(drain) = context.set_online_status(true) {
        let report = drain.await?;
        println!(
            "Drain: applied={} evicted={} remaining={}",
            report.applied,
            report.evicted.len(),
            report.remaining
        );
    }

    let synced = cart.snapshot();
    println!("Synced cart (version {}):", synced.version);
    print_lines(&synced.items);
    println!("  count={} total={}", synced.cart_count(), synced.total_price());

    let server = service.items();
    if server != synced.items {
        return Err(CommandError::Diverged(format!(
            "server has {} lines, local has {}",
            server.len(),
            synced.items.len()
        )));
    }
    println!("Server matches local cart ({} requests applied)", service.applied_count());

    Ok(())
}
