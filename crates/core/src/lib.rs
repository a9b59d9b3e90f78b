//! Lockgate Core - Shared domain types.
//!
//! This crate provides the types shared by every Lockgate component:
//! - `server` - Access routes, resolver, and reconciliation sweeper
//! - `cli` - Migrations and one-shot maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. Stores, chain readers, and Discord clients live in the server
//! crate behind traits that operate on these types.
//!
//! # Modules
//!
//! - [`types`] - Discord snowflake IDs, wallet addresses, nonces, lock
//!   descriptors, and user records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
