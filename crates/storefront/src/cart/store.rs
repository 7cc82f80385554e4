//! The cart store: validated mutations, write-through, change notification.

use std::collections::HashSet;

use rust_decimal::Decimal;
use takeout_core::{FoodId, Price, Quantity};
use tracing::{debug, warn};

use super::snapshot::{
    MemorySnapshotStore, SnapshotStore, decode_snapshot, encode_snapshot,
};
use super::state::{CartLine, CartLineInput, CartState, validate_name};
use super::{CartError, PersistenceUnavailable};

/// Handle returned by [`CartStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Notification delivered to subscribers.
#[derive(Debug)]
pub enum CartEvent<'a> {
    /// A mutation was applied; this is the new state.
    Changed(&'a CartState),
    /// The mutation was applied but could not be saved.
    PersistenceUnavailable(&'a PersistenceUnavailable),
}

type Subscriber = Box<dyn FnMut(&CartEvent<'_>)>;

/// Single-writer cart container with durable snapshots.
///
/// See the [module docs](super) for the model.
pub struct CartStore<S: SnapshotStore = MemorySnapshotStore> {
    state: CartState,
    snapshots: S,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    persistence_warning: Option<PersistenceUnavailable>,
}

impl<S: SnapshotStore> std::fmt::Debug for CartStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .field("persistence_warning", &self.persistence_warning)
            .finish_non_exhaustive()
    }
}

impl<S: SnapshotStore> CartStore<S> {
    /// Open the store, seeding it from the saved snapshot.
    ///
    /// A missing snapshot yields an empty cart. An unreadable or corrupt one
    /// is logged and also yields an empty cart; it is overwritten by the
    /// next mutation.
    pub fn open(snapshots: S) -> Self {
        let state = match snapshots.load() {
            Ok(Some(raw)) => decode_snapshot(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unusable cart snapshot");
                CartState::empty()
            }),
            Ok(None) => CartState::empty(),
            Err(e) => {
                warn!(error = %e, "Failed to read cart snapshot, starting empty");
                CartState::empty()
            }
        };
        debug!(
            lines = state.lines().len(),
            total = %state.total(),
            "Cart store opened"
        );

        Self {
            state,
            snapshots,
            subscribers: Vec::new(),
            next_subscription: 0,
            persistence_warning: None,
        }
    }

    /// Current cart state.
    #[must_use]
    pub const fn state(&self) -> &CartState {
        &self.state
    }

    /// Sum of all line subtotals.
    #[must_use]
    pub const fn get_total(&self) -> Price {
        self.state.total()
    }

    /// Total number of units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.state.item_count()
    }

    /// Set while the latest state has not been saved.
    #[must_use]
    pub const fn persistence_warning(&self) -> Option<&PersistenceUnavailable> {
        self.persistence_warning.as_ref()
    }

    /// Add one unit of an item.
    ///
    /// A new item gets a line with quantity 1. An item already in the cart
    /// has its quantity incremented; the line keeps the name and unit price
    /// captured when it was first added.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidArgument`] for an empty ID or name, a
    /// negative price, a line already at the maximum quantity, or a subtotal
    /// or total too large to represent. The cart is left unchanged.
    pub fn add_item(
        &mut self,
        item_id: &str,
        name: &str,
        unit_price: Decimal,
    ) -> Result<(), CartError> {
        let item_id = FoodId::parse(item_id)?;
        let name = validate_name(name)?;
        let unit_price = Price::new(unit_price)?;

        let mut lines = self.state.lines().to_vec();
        if let Some(line) = lines.iter_mut().find(|line| line.item_id() == &item_id) {
            let quantity = line.quantity().incremented().ok_or_else(|| {
                CartError::InvalidArgument(format!(
                    "item {item_id} is already at the maximum quantity of {}",
                    Quantity::MAX
                ))
            })?;
            *line = line.with_quantity(quantity)?;
        } else {
            lines.push(CartLine::new(item_id.clone(), name, unit_price, Quantity::ONE)?);
        }
        let next = CartState::from_parts(lines, self.delivery_address())?;

        debug!(item_id = %item_id, "Added item to cart");
        self.commit(next);
        Ok(())
    }

    /// Remove an item's line entirely.
    ///
    /// Removing an item that is not in the cart does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidArgument`] for an empty ID.
    pub fn remove_item(&mut self, item_id: &str) -> Result<(), CartError> {
        let item_id = FoodId::parse(item_id)?;
        if self.state.line(&item_id).is_none() {
            debug!(item_id = %item_id, "Remove of absent item ignored");
            return Ok(());
        }

        let lines = self
            .state
            .lines()
            .iter()
            .filter(|line| line.item_id() != &item_id)
            .cloned()
            .collect();
        let next = CartState::from_parts(lines, self.delivery_address())?;

        debug!(item_id = %item_id, "Removed item from cart");
        self.commit(next);
        Ok(())
    }

    /// Set an item's quantity.
    ///
    /// Use [`remove_item`](Self::remove_item) to take an item out.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidArgument`] if `quantity` is below 1 (or
    /// above [`Quantity::MAX`]) or the ID is empty, and
    /// [`CartError::NotFound`] if the item is not in the cart. A quantity
    /// whose subtotal or total is too large to represent is also
    /// [`CartError::InvalidArgument`].
    pub fn update_quantity(&mut self, item_id: &str, quantity: i64) -> Result<(), CartError> {
        let quantity = Quantity::try_from(quantity)?;
        let item_id = FoodId::parse(item_id)?;
        if self.state.line(&item_id).is_none() {
            return Err(CartError::NotFound(item_id));
        }

        let lines = self
            .state
            .lines()
            .iter()
            .map(|line| {
                if line.item_id() == &item_id {
                    line.with_quantity(quantity)
                } else {
                    Ok(line.clone())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let next = CartState::from_parts(lines, self.delivery_address())?;

        debug!(item_id = %item_id, quantity = %quantity, "Updated cart quantity");
        self.commit(next);
        Ok(())
    }

    /// Empty the cart and forget the delivery address.
    pub fn clear_cart(&mut self) {
        debug!("Cleared cart");
        self.commit(CartState::empty());
    }

    /// Set or clear the delivery address. Blank input clears it.
    pub fn set_delivery_address(&mut self, address: Option<&str>) {
        let address = address
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_owned);
        self.commit(self.state.with_delivery_address(address));
    }

    /// Replace every line with an authoritative copy.
    ///
    /// Used to resynchronize from a remote cart. The incoming lines replace
    /// the current ones outright; nothing is merged. The delivery address is
    /// kept. Every line is validated first, so one bad line rejects the
    /// whole call and leaves the cart untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidArgument`] if any line is invalid, an
    /// item ID appears more than once, or the total is too large to
    /// represent.
    pub fn replace_all<I>(&mut self, lines: I) -> Result<(), CartError>
    where
        I: IntoIterator<Item = CartLineInput>,
    {
        let mut seen = HashSet::new();
        let mut validated = Vec::new();
        for input in lines {
            let line = input.validate()?;
            if !seen.insert(line.item_id().clone()) {
                return Err(CartError::InvalidArgument(format!(
                    "item {} appears more than once",
                    line.item_id()
                )));
            }
            validated.push(line);
        }

        let next = CartState::from_parts(validated, self.delivery_address())?;

        debug!(lines = next.lines().len(), "Replaced cart contents");
        self.commit(next);
        Ok(())
    }

    /// Register a callback invoked after every mutation.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&CartEvent<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn delivery_address(&self) -> Option<String> {
        self.state.delivery_address().map(str::to_owned)
    }

    /// Install the next state, write it through, and notify subscribers.
    fn commit(&mut self, next: CartState) {
        debug_assert!(next.is_consistent());
        self.state = next;

        self.persist();

        for (_, callback) in &mut self.subscribers {
            callback(&CartEvent::Changed(&self.state));
        }
        if let Some(warning) = &self.persistence_warning {
            for (_, callback) in &mut self.subscribers {
                callback(&CartEvent::PersistenceUnavailable(warning));
            }
        }
    }

    fn persist(&mut self) {
        let result = encode_snapshot(&self.state).and_then(|raw| self.snapshots.save(&raw));
        match result {
            Ok(()) => {
                if self.persistence_warning.take().is_some() {
                    debug!("Cart snapshot writes recovered");
                }
            }
            Err(e) => {
                warn!(error = %e, "Cart snapshot could not be saved, continuing in memory");
                self.persistence_warning = Some(PersistenceUnavailable::from(e));
            }
        }
    }
}
