//! Client-side shopping cart.
//!
//! # Model
//!
//! A cart is a list of [`CartLine`]s, unique by item ID, plus an optional
//! delivery address. Each line's subtotal and the cart total are derived
//! values: they are recomputed from scratch on every mutation so the total
//! can never drift from the sum of the lines.
//!
//! # Ownership
//!
//! [`CartStore`] is an explicitly constructed, single-writer container.
//! Whoever drives the UI owns it and passes it where it is needed; observers
//! register callbacks with [`CartStore::subscribe`]. Every mutation builds
//! the next [`CartState`] and swaps it in whole.
//!
//! # Durability
//!
//! The state is written through to a [`SnapshotStore`] after each mutation
//! under the fixed key [`SNAPSHOT_KEY`]. A failed write never undoes the
//! in-memory change; it is surfaced as a [`PersistenceUnavailable`] warning.
//!
//! # Example
//!
//! ```rust
//! use rust_decimal::dec;
//! use takeout_storefront::cart::{CartStore, MemorySnapshotStore};
//!
//! let mut cart = CartStore::open(MemorySnapshotStore::new());
//! cart.add_item("p1", "Pizza", dec!(10.0)).unwrap();
//! cart.add_item("p1", "Pizza", dec!(10.0)).unwrap();
//!
//! assert_eq!(cart.state().lines().len(), 1);
//! assert_eq!(cart.get_total().amount(), dec!(20));
//! ```

mod snapshot;
mod state;
mod store;

pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, SNAPSHOT_KEY, SNAPSHOT_VERSION, SnapshotError,
    SnapshotStore, decode_snapshot, encode_snapshot,
};
pub use state::{CartLine, CartLineInput, CartState};
pub use store::{CartEvent, CartStore, SubscriptionId};

use takeout_core::{FoodId, IdError, PriceError, QuantityError};
use thiserror::Error;

/// Errors returned by cart operations.
///
/// Both variants are raised before anything is changed: a failed operation
/// leaves the cart exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Bad input: negative price, non-positive quantity, empty identifier.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation requires a line that is not in the cart.
    #[error("item {0} is not in the cart")]
    NotFound(FoodId),
}

impl From<IdError> for CartError {
    fn from(err: IdError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<PriceError> for CartError {
    fn from(err: PriceError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<QuantityError> for CartError {
    fn from(err: QuantityError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Non-fatal warning: the latest cart state could not be made durable.
///
/// The in-memory cart is still correct and usable. The warning is cleared
/// by the next successful write.
#[derive(Debug, Error)]
#[error("cart changes are not being saved: {source}")]
pub struct PersistenceUnavailable {
    #[from]
    source: SnapshotError,
}

impl PersistenceUnavailable {
    /// The snapshot failure behind this warning.
    #[must_use]
    pub const fn cause(&self) -> &SnapshotError {
        &self.source
    }
}
