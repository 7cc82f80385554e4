//! Takeout Storefront library.
//!
//! Everything the storefront does outside of presentation lives here:
//!
//! - [`cart`] - The client-side cart store, its invariants, and its durable
//!   snapshot
//! - [`backend`] - Typed client for the hosted backend (auth, catalog, cart
//!   rows, orders, profile)
//! - [`sync`] - Ordered mirroring of cart mutations to the backend and
//!   reconciliation from the server copy
//! - [`checkout`] - Turning the cart into an order
//! - [`session`] - Persisted sign-in state and route protection
//! - [`config`], [`error`], [`telemetry`] - Ambient plumbing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod session;
pub mod sync;
pub mod telemetry;
