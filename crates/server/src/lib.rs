//! Lockgate server library.
//!
//! Gates a Discord guild role on holding a key of an on-chain lock. This
//! crate provides the server as a library so it can be tested end to end and
//! driven by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod chain;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
