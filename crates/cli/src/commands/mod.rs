//! Subcommand implementations.

pub mod inspect;
pub mod simulate;

use food_cart_core::{CartItem, QueuedOperation};
use food_cart_sync::{CartError, ConfigError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The background drain task panicked or was cancelled.
    #[error("Queue drain task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The simulated cart ended up different from the server.
    #[error("Local cart diverged from server: {0}")]
    Diverged(String),
}

#[allow(clippy::print_stdout)]
fn print_lines(items: &[CartItem]) {
    if items.is_empty() {
        println!("  (no lines)");
        return;
    }
    for item in items {
        let options: Vec<&str> = item.selected_option.iter().map(|o| o.name.as_str()).collect();
        let options = if options.is_empty() {
            String::new()
        } else {
            format!(" [{}]", options.join(", "))
        };
        println!(
            "  {:>3} x {}{} @ {} = {}",
            item.quantity,
            item.product.name,
            options,
            item.product.price,
            item.line_total()
        );
    }
}

#[allow(clippy::print_stdout)]
fn print_queue(queue: &[QueuedOperation]) {
    if queue.is_empty() {
        println!("  (empty)");
        return;
    }
    for op in queue {
        let target = op
            .operation
            .product_id()
            .map_or_else(|| "*".to_string(), ToString::to_string);
        println!(
            "  {} {:<6} {:<16} retries={} at {}",
            op.id,
            op.kind(),
            target,
            op.retries,
            op.timestamp.to_rfc3339()
        );
    }
}
