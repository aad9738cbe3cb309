//! Food Cart Core - Cart model types.
//!
//! This crate provides the value types shared by the cart sync engine and its
//! tooling:
//! - `sync` - Offline-first cart store, operation queue and service adapters
//! - `cli` - Command-line tools for inspecting persisted carts
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no network
//! clients, no async. Optimistic application and offline replay both go
//! through the line operations defined here, so a queued intent always
//! produces the same end state as the direct call it stands in for.
//!
//! # Modules
//!
//! - [`types`] - Ids, prices, cart lines, queued operations and validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
