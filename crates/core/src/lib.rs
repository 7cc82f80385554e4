//! Takeout Core - Shared domain types.
//!
//! This crate provides the types used across all Takeout components:
//! - `storefront` - Cart store, snapshot persistence, backend client
//! - `cli` - The `takeout` command-line storefront
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no persistence. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, quantities,
//!   emails, and order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
