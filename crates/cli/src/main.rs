//! Food Cart CLI - inspect persisted carts and simulate offline replay.
//!
//! # Usage
//!
//! ```bash
//! # Show the backup and offline queue stored in a directory
//! cart-cli inspect --dir ./.cart
//!
//! # Run the offline replay scenario against an in-memory cart service
//! cart-cli simulate --dir ./.cart
//! ```
//!
//! # Commands
//!
//! - `inspect` - Print persisted lines, totals and queued operations
//! - `simulate` - Mutate offline, reconnect, drain the queue and compare with the server

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Food cart sync tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted cart backup and offline queue
    Inspect {
        /// Directory holding the persisted slots
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Run an offline edit and reconnect scenario
    Simulate {
        /// Directory to persist the simulated cart into
        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "food_cart_sync=info,food_cart_cli=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Inspect { dir } => commands::inspect::run(&dir).await,
        Commands::Simulate { dir } => commands::simulate::run(&dir).await,
    }
}
