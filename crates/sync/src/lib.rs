//! Food Cart Sync - offline-first cart store.
//!
//! Mutations are applied to local state immediately and then confirmed by the
//! Cart Service, or queued while disconnected and replayed in order once the
//! connection returns. A confirmed failure rolls the affected lines back.
//!
//! # Architecture
//!
//! - [`CartStore`] is the public cart API; [`CartContext`] shares one store
//!   per session and schedules queue drains on reconnect
//! - The mutation engine owns the snapshot, apply, confirm or queue, rollback
//!   protocol
//! - [`RetryExecutor`] is the single retry policy for every remote call
//! - [`service::CartService`] and [`storage::PersistentStore`] are the
//!   external seams, each with an in-memory and a real adapter
//!
//! # Modules
//!
//! - [`config`] - Environment-driven configuration
//! - [`queue`] - FIFO operation queue with bounded retries
//! - [`service`] - Cart Service contract, HTTP and in-memory adapters
//! - [`storage`] - Persistent store contract, file and in-memory adapters, backup
//! - [`state`] - Cart aggregate and outcome types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
mod engine;
pub mod error;
pub mod queue;
pub mod retry;
pub mod service;
pub mod state;
pub mod storage;
pub mod store;

pub use config::{CartApiConfig, CartSyncConfig, ConfigError};
pub use context::CartContext;
pub use error::{CartError, Result};
pub use queue::{FailureOutcome, OperationQueue};
pub use retry::RetryExecutor;
pub use state::{CartNotice, CartState, LineActivity, LoadOutcome, MutationOutcome, QueueReport};
pub use store::{CartStore, QuantityUpdate};
